//! Hand-rolled error types, one per failure boundary. Mirrors
//! `collector::procfs::process::CollectError`: plain enums, manual `Display`,
//! no `anyhow`/`thiserror`.

use std::fmt;

/// A collector failed to populate part of a snapshot. Soft failure — the
/// snapshot as a whole remains valid and is recorded in `Snapshot::errors`.
#[derive(Debug)]
pub enum CollectError {
    Io(std::io::Error),
    Parse(String),
    Unavailable(&'static str),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {e}"),
            CollectError::Parse(msg) => write!(f, "parse error: {msg}"),
            CollectError::Unavailable(what) => write!(f, "{what} unavailable on this kernel"),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// A probe (on-demand or sentinel) could not be attached. Collected per
/// probe into `errors`; other probes proceed independently.
#[derive(Debug)]
pub enum ProbeAttachError {
    MissingBtf,
    InsufficientPrivilege,
    Load(String),
}

impl fmt::Display for ProbeAttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeAttachError::MissingBtf => write!(f, "kernel lacks BTF support"),
            ProbeAttachError::InsufficientPrivilege => write!(f, "insufficient privilege to attach BPF program"),
            ProbeAttachError::Load(msg) => write!(f, "failed to load BPF object: {msg}"),
        }
    }
}

impl std::error::Error for ProbeAttachError {}

/// A recorder/event-log sink failed to write one frame or line. Non-fatal —
/// the tick continues; the failure is logged and counted.
#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "sink I/O error: {e}"),
            SinkError::Serialize(e) => write!(f, "sink serialization error: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Serialize(e)
    }
}

/// An alert transport (webhook, email, Slack, Telegram, shell command) failed
/// to deliver. Fire-and-forget — never blocks the scheduler.
#[derive(Debug)]
pub enum AlertTransportError {
    Timeout,
    Http(u16),
    Io(String),
}

impl fmt::Display for AlertTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertTransportError::Timeout => write!(f, "alert transport timed out"),
            AlertTransportError::Http(status) => write!(f, "alert transport returned HTTP {status}"),
            AlertTransportError::Io(msg) => write!(f, "alert transport I/O error: {msg}"),
        }
    }
}

impl std::error::Error for AlertTransportError {}

/// A single field failed to parse from a transient source (`/proc` file that
/// raced a process exit). Retried next tick, never fatal.
#[derive(Debug)]
pub struct TransientParseError {
    pub field: &'static str,
    pub cause: String,
}

impl fmt::Display for TransientParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transient parse failure on {}: {}", self.field, self.cause)
    }
}

impl std::error::Error for TransientParseError {}

/// Configuration is invalid. Fatal — the daemon refuses to start.
#[derive(Debug)]
pub enum ConfigError {
    InvalidWebhook(String),
    UnsupportedArchitecture(String),
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidWebhook(url) => write!(f, "webhook URL rejected by policy: {url}"),
            ConfigError::UnsupportedArchitecture(arch) => {
                write!(f, "unsupported architecture for syscall dissection: {arch}")
            }
            ConfigError::Malformed(msg) => write!(f, "malformed configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

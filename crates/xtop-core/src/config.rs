//! Configuration — `interval_sec`, `history_size`,
//! threshold-profile overrides, alert-transport addresses, the Prometheus
//! bind address, and the `mask_ip` flag. Parsing failures are fatal at
//! startup, validated at construction rather than deferred to a
//! config-parsing crate.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Resolves the daemon state directory:
/// `$XDG_CONFIG_HOME/xtop` if set, else `~/.xtop`.
pub fn daemon_state_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("xtop");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".xtop")
}

/// `<state_dir>/daemon.pid` — holds the running daemon's PID.
pub fn pid_file_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("daemon.pid")
}

/// `<state_dir>/events.jsonl` — the append-only event log.
pub fn events_log_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// `<state_dir>/incidents/incident-<ISO>.json` — one snapshot per incident.
pub fn incident_path(state_dir: &std::path::Path, iso_timestamp: &str) -> PathBuf {
    state_dir.join("incidents").join(format!("incident-{iso_timestamp}.json"))
}

/// `<state_dir>/current.jsonl` — rolling per-tick compact summary, rotated at
/// 10 MiB to `current.jsonl.old`.
pub fn current_summary_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("current.jsonl")
}

/// `{warn, crit}` override for one evidence id.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warn: f64,
    pub crit: f64,
}

/// Built-in threshold profiles: static data selected by name rather than
/// computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Database,
    Network,
    Mixed,
    Compute,
    Gateway,
}

impl Profile {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "database" => Some(Profile::Database),
            "network" => Some(Profile::Network),
            "mixed" => Some(Profile::Mixed),
            "compute" => Some(Profile::Compute),
            "gateway" => Some(Profile::Gateway),
            _ => None,
        }
    }

    /// Profile-specific tightened/loosened thresholds, layered over the
    /// scorers' built-in defaults. Database servers care more about IO
    /// latency than CPU steal; gateways care more about network drops and
    /// conntrack than disk throughput; compute nodes tolerate higher CPU
    /// steal (shared hypervisor) before alerting.
    pub fn overrides(self) -> HashMap<&'static str, Threshold> {
        let mut m = HashMap::new();
        match self {
            Profile::Database => {
                m.insert("io.disk.latency", Threshold { warn: 10.0, crit: 100.0 });
                m.insert("io.disk.util", Threshold { warn: 70.0, crit: 95.0 });
                m.insert("mem.swap.activity", Threshold { warn: 0.5, crit: 5.0 });
            }
            Profile::Network => {
                m.insert("net.drops", Threshold { warn: 0.5, crit: 40.0 });
                m.insert("net.conntrack", Threshold { warn: 60.0, crit: 85.0 });
                m.insert("net.closewait", Threshold { warn: 50.0, crit: 500.0 });
            }
            Profile::Mixed => {}
            Profile::Compute => {
                m.insert("cpu.steal", Threshold { warn: 3.0, crit: 20.0 });
                m.insert("cpu.cgroup.throttle", Threshold { warn: 10.0, crit: 50.0 });
            }
            Profile::Gateway => {
                m.insert("net.drops", Threshold { warn: 1.0, crit: 50.0 });
                m.insert("net.conntrack", Threshold { warn: 65.0, crit: 90.0 });
                m.insert("net.errors", Threshold { warn: 1.0, crit: 20.0 });
            }
        }
        m
    }
}

/// Alert-transport destinations, stored as opaque validated strings — the
/// core never dials out itself (transports are out of scope); it
/// only validates the webhook URL shape so a daemon-layer dispatcher can
/// trust the value it reads back out of `Config`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlertTransports {
    pub webhook: Option<String>,
    pub command: Option<String>,
    pub email: Option<String>,
    pub slack_webhook: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub interval_sec: u64,
    pub history_size: usize,
    pub threshold_overrides: HashMap<String, Threshold>,
    pub alerts: AlertTransports,
    pub prometheus_addr: Option<String>,
    pub mask_ip: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_sec: 2,
            history_size: 900,
            threshold_overrides: HashMap::new(),
            alerts: AlertTransports::default(),
            prometheus_addr: None,
            mask_ip: false,
        }
    }
}

impl Config {
    /// Validates invariants that must hold before the daemon starts (spec
    /// Fatal at startup if any invariant below is violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_sec < 1 {
            return Err(ConfigError::Malformed("interval_sec must be >= 1".to_string()));
        }
        if self.history_size == 0 {
            return Err(ConfigError::Malformed("history_size must be >= 1".to_string()));
        }
        if let Some(url) = &self.alerts.webhook {
            validate_webhook_url(url)?;
        }
        if let Some(url) = &self.alerts.slack_webhook {
            validate_webhook_url(url)?;
        }
        if std::env::consts::ARCH != "x86_64" {
            return Err(ConfigError::UnsupportedArchitecture(std::env::consts::ARCH.to_string()));
        }
        Ok(())
    }

    /// Applies a named built-in profile's overrides on top of whatever is
    /// already set, without clearing prior manual overrides for other ids.
    pub fn apply_profile(&mut self, profile: Profile) {
        for (id, threshold) in profile.overrides() {
            self.threshold_overrides.insert(id.to_string(), threshold);
        }
    }

    pub fn threshold_for(&self, id: &str, default_warn: f64, default_crit: f64) -> (f64, f64) {
        match self.threshold_overrides.get(id) {
            Some(t) => (t.warn, t.crit),
            None => (default_warn, default_crit),
        }
    }
}

/// RFC1918 private ranges rejected alongside the named hosts below.
fn is_rfc1918(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 10
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
        }
        IpAddr::V6(_) => false,
    }
}

const BLOCKED_HOSTS: &[&str] = &["localhost", "metadata.google.internal"];

/// Validates a webhook/Slack URL: must be `http`/`https`,
/// must not resolve to localhost, loopback, link-local, RFC1918, or the
/// cloud-metadata hosts.
pub fn validate_webhook_url(url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::InvalidWebhook(url.to_string()))?;

    let host = rest.split('/').next().unwrap_or("");
    let host = host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host);
    let host_only = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    let host_only = host_only.trim_start_matches('[').trim_end_matches(']');

    if BLOCKED_HOSTS.contains(&host_only) {
        return Err(ConfigError::InvalidWebhook(url.to_string()));
    }
    if host_only == "169.254.169.254" {
        return Err(ConfigError::InvalidWebhook(url.to_string()));
    }

    if let Ok(ip) = host_only.parse::<IpAddr>() {
        if ip.is_loopback() || ip.is_unspecified() || is_rfc1918(&ip) {
            return Err(ConfigError::InvalidWebhook(url.to_string()));
        }
        match ip {
            IpAddr::V4(v4) if v4.is_link_local() => return Err(ConfigError::InvalidWebhook(url.to_string())),
            IpAddr::V6(v6) if (v6.segments()[0] & 0xffc0) == 0xfe80 => {
                return Err(ConfigError::InvalidWebhook(url.to_string()));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Open question resolution: IP masking is wired
/// through from config into core evidence text, not left presentation-only.
/// Replaces the first IPv4/IPv6-looking token with `<redacted-ip>` when
/// `enabled`; a borrowed no-op otherwise.
pub fn mask_ip_if_configured(text: &str, enabled: bool) -> Cow<'_, str> {
    if !enabled {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    for token in text.split_inclusive(' ') {
        let trimmed = token.trim_end_matches([' ', ',', ':']);
        if looks_like_ip(trimmed) {
            let suffix = &token[trimmed.len()..];
            out.push_str("<redacted-ip>");
            out.push_str(suffix);
            changed = true;
        } else {
            out.push_str(token);
        }
    }
    if changed { Cow::Owned(out) } else { Cow::Borrowed(text) }
}

fn looks_like_ip(token: &str) -> bool {
    token.parse::<IpAddr>().is_ok()
}

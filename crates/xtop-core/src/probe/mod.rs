//! Probe Manager (C9) — two cooperating subsystems sharing the
//! `Probe` abstraction: on-demand deep-dive probes ([`manager::ProbeManager`])
//! and the always-on sentinel ([`sentinel::SentinelManager`]).

pub mod histogram;
#[cfg(feature = "sentinel")]
pub mod libbpf_backend;
pub mod manager;
pub mod sentinel;

use std::collections::HashMap;

use crate::errors::ProbeAttachError;

/// One raw sample drained from a probe's kernel-side map: a key (pid,
/// device, reason, ...) and an accumulator value.
#[derive(Clone, Debug)]
pub struct RawSample {
    pub key: String,
    pub value: f64,
    pub tags: HashMap<String, String>,
}

/// Implemented by every BPF-backed probe, on-demand or sentinel. Attach
/// failures are per-probe and don't abort siblings.
pub trait Probe: Send {
    fn name(&self) -> &'static str;
    fn attach(&mut self) -> Result<(), ProbeAttachError>;
    fn read(&mut self) -> Vec<RawSample>;
    fn close(&mut self);
}

/// Per-probe previous-accumulator map, keyed the same as `RawSample::key`,
/// used to turn cumulative BPF counters into per-tick deltas/rates.
#[derive(Default, Clone, Debug)]
pub struct PrevValueMap {
    values: HashMap<String, f64>,
}

impl PrevValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `curr - prev` (floored at 0, counters never go backwards
    /// except on reset) and stores `curr` as the new previous value.
    pub fn delta(&mut self, key: &str, curr: f64) -> f64 {
        let prev = self.values.insert(key.to_string(), curr).unwrap_or(0.0);
        (curr - prev).max(0.0)
    }

    /// Current value without affecting the stored previous value — used by
    /// event-like probes that read-and-clear instead of diffing.
    pub fn peek(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Typed result of one on-demand probe run.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Finding {
    OffCpu { pid: u32, comm: String, pct: f64, switches: u64 },
    IoLatency { device: String, p50_ns: f64, p95_ns: f64, p99_ns: f64 },
    LockWaiter { pid: u32, comm: String, avg_wait_ms: f64, count: u64 },
    TcpRetransmit { pid: u32, comm: String, dest: String, count: u64 },
    NetThroughput { pid: u32, comm: String, mb_s: f64 },
    TcpRtt { dest: String, avg_ms: f64 },
    ConnectLatency { dest: String, avg_ms: f64 },
    RunQueueLatency { pid: u32, comm: String, avg_ms: f64 },
    WritebackStall { device: String, avg_ms: f64 },
    PageFaultLatency { pid: u32, comm: String, avg_us: f64 },
    SwapEvict { pid: u32, comm: String, pages: u64 },
    SyscallDissection { pid: u32, comm: String, groups: HashMap<SyscallGroup, u64> },
    SocketIo { pid: u32, comm: String, local: String, remote: String, bytes_s: f64 },
}

/// Syscalls bucketed by purpose.
/// The number table backing this classification is x86_64-specific — other architectures are rejected at startup rather than
/// risk mislabeled groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyscallGroup {
    Read,
    Write,
    LockSync,
    Poll,
    Sleep,
    OpenClose,
    Mmap,
    Other,
}

/// x86_64 syscall-number → group table. Returns `None` for unmapped numbers,
/// folded into `SyscallGroup::Other` by callers.
pub fn classify_syscall_x86_64(nr: u64) -> SyscallGroup {
    match nr {
        0 | 17 | 19 | 89 => SyscallGroup::Read,       // read, pread64, readv, readlink
        1 | 18 | 20 => SyscallGroup::Write,           // write, pwrite64, writev
        10 | 11 | 9 => SyscallGroup::Mmap,            // mprotect, munmap, mmap
        2 | 3 | 32 | 33 => SyscallGroup::OpenClose,   // open, close, dup, dup2
        257 | 258 => SyscallGroup::OpenClose,         // openat, mkdirat
        7 | 232 | 281 => SyscallGroup::Poll,          // poll, epoll_wait, epoll_pwait
        35 => SyscallGroup::Sleep,                    // nanosleep
        38 | 202 | 221 => SyscallGroup::LockSync,     // setitimer, futex, fadvise64
        _ => SyscallGroup::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prev_value_map_first_read_deltas_from_zero() {
        let mut map = PrevValueMap::new();
        assert_eq!(map.delta("cpu0", 120.0), 120.0);
    }

    #[test]
    fn prev_value_map_deltas_against_stored_previous() {
        let mut map = PrevValueMap::new();
        map.delta("cpu0", 100.0);
        assert_eq!(map.delta("cpu0", 150.0), 50.0);
    }

    #[test]
    fn prev_value_map_never_returns_negative_on_counter_reset() {
        let mut map = PrevValueMap::new();
        map.delta("cpu0", 500.0);
        assert_eq!(map.delta("cpu0", 10.0), 0.0);
    }

    #[test]
    fn futex_classified_as_lock_sync() {
        assert_eq!(classify_syscall_x86_64(202), SyscallGroup::LockSync);
    }

    #[test]
    fn unknown_syscall_number_falls_back_to_other() {
        assert_eq!(classify_syscall_x86_64(9999), SyscallGroup::Other);
    }
}

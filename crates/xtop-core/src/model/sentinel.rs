//! Always-on eBPF sentinel output, folded into each [`super::snapshot::Snapshot`].
//!
//! Populated by [`crate::probe::SentinelManager`].
//! All `*_rate` fields are already per-second (delta / elapsed); the
//! event-like counters (`oom_kills`, `module_loads`, `execs`,
//! `ptrace_attaches`) are read-and-clear per tick, not rates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SentinelData {
    /// Packet drops/s, excluding benign TCP lifecycle/flow-control reasons.
    pub pkt_drop_rate: f64,
    /// Every observed drop reason, including the benign ones folded out of
    /// `pkt_drop_rate`.
    pub drop_reasons: HashMap<String, f64>,
    pub tcp_resets_rate: f64,
    /// Per-cgroup-path CPU throttle event rate, events/s.
    pub cgroup_throttle_rate: HashMap<String, f64>,
    /// OOM kills observed by the BPF probe since the last tick.
    pub oom_kills: u32,
    pub module_loads: u32,
    pub execs: u32,
    pub ptrace_attaches: u32,
    /// Reason attach failed (missing BTF, insufficient privilege, ...), if
    /// any probe could not be attached. Scoring proceeds without BPF-only
    /// evidence when this is set.
    pub attach_err: Option<String>,
}

/// TCP drop reasons considered part of normal connection lifecycle or flow
/// control — excluded from the headline `pkt_drop_rate` but still listed in
/// `drop_reasons`.
pub const BENIGN_DROP_REASONS: &[&str] = &[
    "TCP_OLD_ACK",
    "TCP_ZEROWINDOW",
    "TCP_CLOSE",
    "TCP_FLAGS",
    "NOT_SPECIFIED",
    "TCP_RFC7323_PAWS",
];

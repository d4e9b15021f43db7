//! Typed evidence — the atomic unit of diagnosis (C1).
//!
//! An [`Evidence`] is a normalized, confidence-weighted signal. Domain
//! scorers emit a fixed set of these per tick; correlation and
//! anomaly/trend reference them by `id` only, never by pointer — they
//! don't outlive the [`crate::AnalysisResult`] they were produced in.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Cpu,
    Memory,
    Io,
    Network,
}

impl Domain {
    /// CPU < Memory < IO < Network, used to break primary-selection ties.
    pub const ORDER: [Domain; 4] = [Domain::Cpu, Domain::Memory, Domain::Io, Domain::Network];

    pub fn rank(self) -> usize {
        Self::ORDER.iter().position(|d| *d == self).unwrap()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Crit,
}

/// Slot an evidence id contributes to in the weighted domain score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Psi,
    Latency,
    Queue,
    Secondary,
}

impl Weight {
    /// Fusion weight for the weighted domain score.
    pub fn slot_weight(self) -> f64 {
        match self {
            Weight::Psi => 0.35,
            Weight::Latency => 0.25,
            Weight::Queue => 0.20,
            Weight::Secondary => 0.20,
        }
    }

    pub const ALL: [Weight; 4] = [Weight::Psi, Weight::Latency, Weight::Queue, Weight::Secondary];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Cgroup,
    Service,
    Pid,
}

/// An attribution of an evidence to a responsible entity. Shares need not sum
/// to 1 across the owner list of one evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    pub id: String,
    pub share: f64,
    pub confidence: f64,
}

impl Owner {
    pub fn new(kind: OwnerKind, id: impl Into<String>, share: f64, confidence: f64) -> Self {
        Self {
            kind,
            id: id.into(),
            share: share.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Hierarchical dotted key, e.g. `io.disk.latency`.
    pub id: String,
    pub message: String,
    /// Window label the value was computed over, e.g. "10s" or "30s".
    pub window: String,
    pub domain: Domain,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub strength: f64,
    pub confidence: f64,
    /// `true` for direct procfs/eBPF measurement; `false` for
    /// derived/heuristic values.
    pub measured: bool,
    pub owners: Vec<Owner>,
    pub weight: Weight,
}

/// `normalize(value, warn, crit)`: 0 below warn, linear to 1 at crit, clamped.
/// Degenerates to a binary threshold at `warn` when `crit <= warn`.
pub fn normalize(value: f64, warn: f64, crit: f64) -> f64 {
    if crit <= warn {
        return if value >= warn { 1.0 } else { 0.0 };
    }
    ((value - warn) / (crit - warn)).clamp(0.0, 1.0)
}

fn severity_for_strength(strength: f64) -> Severity {
    if strength >= 0.7 {
        Severity::Crit
    } else if strength >= 0.01 {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Static id -> weight lookup. Unknown ids default to `Secondary`.
fn weight_for_id(id: &str) -> Weight {
    const PSI: &[&str] = &[
        "cpu.psi",
        "mem.psi",
        "io.psi",
        "mem.oom.kills",
        "net.tcp.retrans",
        "cpu.sentinel.throttle",
    ];
    const LATENCY: &[&str] = &[
        "cpu.cgroup.throttle",
        "mem.available.low",
        "mem.swap.activity",
        "io.disk.latency",
        "io.disk.util",
        "net.drops",
    ];
    const QUEUE: &[&str] = &["cpu.runqueue", "mem.reclaim.direct", "io.dstate", "net.conntrack"];

    if PSI.contains(&id) {
        Weight::Psi
    } else if LATENCY.contains(&id) {
        Weight::Latency
    } else if QUEUE.contains(&id) {
        Weight::Queue
    } else {
        Weight::Secondary
    }
}

#[allow(clippy::too_many_arguments)]
pub fn emit(
    id: &str,
    domain: Domain,
    value: f64,
    warn: f64,
    crit: f64,
    measured: bool,
    confidence: f64,
    message: impl Into<String>,
    window: impl Into<String>,
    owners: Vec<Owner>,
) -> Evidence {
    let strength = normalize(value, warn, crit);
    Evidence {
        id: id.to_string(),
        message: message.into(),
        window: window.into(),
        domain,
        severity: severity_for_strength(strength),
        value,
        threshold: crit,
        strength,
        confidence: confidence.clamp(0.0, 1.0),
        measured,
        owners,
        weight: weight_for_id(id),
    }
}

/// Count of distinct weight slots with at least one evidence firing at or
/// above `min_strength`. Used by the trust gate and the testable
/// invariant
pub fn groups_fired(evs: &[Evidence], min_strength: f64) -> usize {
    let mut fired = [false; 4];
    for e in evs {
        if e.strength >= min_strength {
            fired[e.weight as usize] = true;
        }
    }
    fired.iter().filter(|f| **f).count()
}

/// `true` if any evidence is a direct measurement above both thresholds —
/// the other half of the trust gate.
pub fn has_measured_high_conf(evs: &[Evidence], min_strength: f64, min_conf: f64) -> bool {
    evs.iter()
        .any(|e| e.measured && e.strength >= min_strength && e.confidence >= min_conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_contract() {
        assert_eq!(normalize(5.0, 10.0, 20.0), 0.0);
        assert_eq!(normalize(10.0, 10.0, 20.0), 0.0);
        assert_eq!(normalize(20.0, 10.0, 20.0), 1.0);
        assert_eq!(normalize(15.0, 10.0, 20.0), 0.5);
        assert_eq!(normalize(30.0, 10.0, 20.0), 1.0);
    }

    #[test]
    fn normalize_degenerate_when_crit_le_warn() {
        assert_eq!(normalize(5.0, 10.0, 10.0), 0.0);
        assert_eq!(normalize(10.0, 10.0, 10.0), 1.0);
        assert_eq!(normalize(5.0, 10.0, 5.0), 0.0);
        assert_eq!(normalize(10.0, 10.0, 5.0), 1.0);
    }

    #[test]
    fn normalize_monotone_non_decreasing() {
        let mut prev = normalize(0.0, 10.0, 20.0);
        for v in 1..=40 {
            let cur = normalize(v as f64, 10.0, 20.0);
            assert!(cur >= prev);
            prev = cur;
        }
    }

    fn ev(id: &str, strength: f64, measured: bool, confidence: f64) -> Evidence {
        Evidence {
            id: id.to_string(),
            message: String::new(),
            window: "10s".into(),
            domain: Domain::Cpu,
            severity: severity_for_strength(strength),
            value: 0.0,
            threshold: 0.0,
            strength,
            confidence,
            measured,
            owners: vec![],
            weight: weight_for_id(id),
        }
    }

    #[test]
    fn groups_fired_counts_distinct_weight_slots() {
        let evs = vec![
            ev("cpu.psi", 0.5, true, 0.9),
            ev("cpu.runqueue", 0.5, true, 0.9),
            ev("cpu.ctxswitch", 0.5, true, 0.9), // secondary, same slot as nothing else here
        ];
        assert_eq!(groups_fired(&evs, 0.35), 3);
        assert_eq!(groups_fired(&evs, 0.9), 0);
    }

    #[test]
    fn trust_gate_requires_measured_high_confidence() {
        let evs = vec![ev("cpu.psi", 0.5, false, 0.9), ev("cpu.runqueue", 0.5, true, 0.5)];
        assert!(!has_measured_high_conf(&evs, 0.35, 0.8));
        let evs2 = vec![ev("cpu.psi", 0.5, true, 0.81)];
        assert!(has_measured_high_conf(&evs2, 0.35, 0.8));
    }
}

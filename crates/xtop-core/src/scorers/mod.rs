//! Domain Scorers (C4) — four trust-gated scorers (CPU, Memory,
//! IO, Network) sharing the same `(snapshot, rates, history) -> RCAEntry`
//! interface.

pub mod cpu;
pub mod io;
pub mod memory;
pub mod network;

use serde::{Deserialize, Serialize};

use crate::evidence::{groups_fired, has_measured_high_conf, Evidence, Owner, Weight};
use crate::history::History;
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

pub const TRUST_MIN_STRENGTH: f64 = 0.35;
pub const TRUST_MIN_CONFIDENCE: f64 = 0.8;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RCAEntry {
    pub bottleneck: String,
    pub score: f64,
    pub groups_fired: usize,
    pub top_cgroup: Option<String>,
    pub top_process: Option<String>,
    pub top_pid: Option<u32>,
    pub evidence: Vec<Evidence>,
    pub confidence: f64,
    pub narrative_chain: Vec<String>,
}

/// Implemented by each of the four domain scorers.
pub trait Scorer: Send + Sync {
    fn bottleneck_name(&self) -> &'static str;
    /// Emits this domain's fixed evidence set for one tick.
    fn emit_evidence(&self, snap: &Snapshot, rates: &RateSnapshot, history: &History) -> Vec<Evidence>;

    fn score(&self, snap: &Snapshot, rates: &RateSnapshot, history: &History) -> RCAEntry {
        let evidence = self.emit_evidence(snap, rates, history);
        score_from_evidence(self.bottleneck_name(), evidence)
    }
}

/// Shared trust-gate + weighted-score + confidence pipeline, factored out so every scorer applies it identically.
pub fn score_from_evidence(bottleneck: &str, evidence: Vec<Evidence>) -> RCAEntry {
    let groups = groups_fired(&evidence, TRUST_MIN_STRENGTH);
    let gated_in = groups >= 2 && has_measured_high_conf(&evidence, TRUST_MIN_STRENGTH, TRUST_MIN_CONFIDENCE);

    let score = if gated_in { weighted_domain_score(&evidence) } else { 0.0 };
    let confidence = domain_confidence(&evidence, groups);
    let (top_cgroup, top_process, top_pid) = top_owner(&evidence);
    let narrative_chain = narrative_fragment(&evidence);

    RCAEntry {
        bottleneck: bottleneck.to_string(),
        score,
        groups_fired: groups,
        top_cgroup,
        top_process,
        top_pid,
        evidence,
        confidence,
        narrative_chain,
    }
}

/// `Σ slot_weight * max_{e in slot}(strength * confidence) * 100`, clamped.
fn weighted_domain_score(evidence: &[Evidence]) -> f64 {
    let mut total = 0.0;
    for slot in Weight::ALL {
        let slot_max = evidence
            .iter()
            .filter(|e| e.weight == slot)
            .map(|e| e.strength * e.confidence)
            .fold(0.0_f64, f64::max);
        total += slot.slot_weight() * slot_max;
    }
    (total * 100.0).clamp(0.0, 100.0)
}

/// `clamp(0.30 + 0.20*(groups-1) + 0.50*avg_confidence_of_fired, 0, 0.98)`;
/// 0 when nothing fires.
fn domain_confidence(evidence: &[Evidence], groups: usize) -> f64 {
    let fired: Vec<&Evidence> = evidence.iter().filter(|e| e.strength >= TRUST_MIN_STRENGTH).collect();
    if fired.is_empty() {
        return 0.0;
    }
    let avg_conf = fired.iter().map(|e| e.confidence).sum::<f64>() / fired.len() as f64;
    (0.30 + 0.20 * (groups as f64 - 1.0) + 0.50 * avg_conf).clamp(0.0, 0.98)
}

/// Highest-share owner among fired evidence, split by kind.
fn top_owner(evidence: &[Evidence]) -> (Option<String>, Option<String>, Option<u32>) {
    let mut best_cgroup: Option<&Owner> = None;
    let mut best_process: Option<&Owner> = None;

    for e in evidence {
        if e.strength < TRUST_MIN_STRENGTH {
            continue;
        }
        for o in &e.owners {
            match o.kind {
                crate::evidence::OwnerKind::Cgroup | crate::evidence::OwnerKind::Service => {
                    if best_cgroup.is_none_or(|b| o.share > b.share) {
                        best_cgroup = Some(o);
                    }
                }
                crate::evidence::OwnerKind::Pid => {
                    if best_process.is_none_or(|b| o.share > b.share) {
                        best_process = Some(o);
                    }
                }
            }
        }
    }

    let top_pid = best_process.and_then(|o| o.id.parse::<u32>().ok());
    (
        best_cgroup.map(|o| o.id.clone()),
        best_process.map(|o| o.id.clone()),
        top_pid,
    )
}

/// Ordered message strings of the strongest fired evidence, used by correlation when no pattern/narrative template matches.
fn narrative_fragment(evidence: &[Evidence]) -> Vec<String> {
    let mut fired: Vec<&Evidence> = evidence.iter().filter(|e| e.strength >= TRUST_MIN_STRENGTH).collect();
    fired.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap());
    fired.into_iter().map(|e| e.message.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{emit, Domain};

    fn ev(id: &str, value: f64, warn: f64, crit: f64, measured: bool, confidence: f64) -> Evidence {
        emit(id, Domain::Cpu, value, warn, crit, measured, confidence, format!("{id} fired"), "10s", vec![])
    }

    #[test]
    fn ungated_evidence_yields_zero_score() {
        let evidence = vec![ev("cpu.psi", 20.0, 2.0, 15.0, true, 0.9)];
        let entry = score_from_evidence("CPU Contention", evidence);
        assert_eq!(entry.score, 0.0);
    }

    #[test]
    fn gated_evidence_yields_positive_score() {
        let evidence = vec![
            ev("cpu.psi", 20.0, 2.0, 15.0, true, 0.9),
            ev("cpu.runqueue", 3.5, 1.0, 3.0, true, 0.9),
        ];
        let entry = score_from_evidence("CPU Contention", evidence);
        assert!(entry.score > 0.0);
        assert!(entry.groups_fired >= 2);
    }

    #[test]
    fn confidence_is_zero_when_nothing_fires() {
        let evidence = vec![ev("cpu.psi", 0.0, 2.0, 15.0, true, 0.9)];
        let entry = score_from_evidence("CPU Contention", evidence);
        assert_eq!(entry.confidence, 0.0);
    }
}

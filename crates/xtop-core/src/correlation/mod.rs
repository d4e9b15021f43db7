//! Correlation (C5) — three pure products built over the
//! evidence of one tick: a narrative sentence (pattern library, falling
//! back to narrative templates), a causal DAG, and a temporal onset chain.

pub mod dag;
pub mod patterns;
pub mod temporal;

use crate::evidence::Evidence;

pub use dag::{build_causal_dag, CausalDag};
pub use temporal::render_temporal_chain;

pub struct CorrelationResult {
    /// Root-cause sentence: a matched pattern's narrative, or a template's
    /// text, or `None` if neither fired.
    pub narrative: Option<String>,
    /// Top-4 fired evidence by strength, used as narrative bullets when no
    /// pattern matched.
    pub bullets: Vec<String>,
    pub causal: CausalDag,
    pub temporal_chain: String,
}

/// Runs all three correlation products over one tick's combined evidence
/// (every domain scorer's output, flattened).
pub fn correlate(evidence: &[Evidence], onset_entries: &[(String, i64)], now: i64) -> CorrelationResult {
    let narrative = patterns::match_pattern(evidence)
        .map(str::to_string)
        .or_else(|| patterns::match_narrative_template(evidence).map(str::to_string));

    let mut fired: Vec<&Evidence> = evidence.iter().filter(|e| e.strength >= 0.35).collect();
    fired.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap());
    let bullets = fired.into_iter().take(4).map(|e| e.message.clone()).collect();

    CorrelationResult {
        narrative,
        bullets,
        causal: build_causal_dag(evidence),
        temporal_chain: render_temporal_chain(onset_entries, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{emit, Domain};

    fn ev(id: &str, value: f64, warn: f64, crit: f64) -> Evidence {
        emit(id, Domain::Cpu, value, warn, crit, true, 0.9, format!("{id} fired"), "10s", vec![])
    }

    #[test]
    fn falls_back_to_template_when_no_pattern_matches() {
        let evs = vec![ev("io.disk.latency", 60.0, 20.0, 200.0), ev("io.disk.util", 97.0, 80.0, 98.0)];
        let result = correlate(&evs, &[], 0);
        assert_eq!(result.narrative.as_deref(), Some("Disk saturation is the dominant bottleneck"));
    }

    #[test]
    fn bullets_capped_at_four_strongest() {
        let evs = vec![
            ev("cpu.psi", 20.0, 2.0, 15.0),
            ev("cpu.runqueue", 3.0, 1.0, 3.0),
            ev("cpu.steal", 10.0, 1.0, 10.0),
            ev("cpu.softirq", 20.0, 5.0, 20.0),
            ev("cpu.ctxswitch", 100_000.0, 30_000.0, 100_000.0),
        ];
        let result = correlate(&evs, &[], 0);
        assert_eq!(result.bullets.len(), 4);
    }
}

//! Pattern library and narrative templates. Both are static
//! data tables, built fresh per call the way `rules::all_rules()` builds its
//! trait-object registry — there's no dynamic state to share across calls.

use crate::evidence::Evidence;

/// One named root-cause signature. `conditions` are `(evidence_id,
/// min_strength)` pairs; a pattern matches when at least `min_match` of them
/// have fired above their threshold.
pub struct Pattern {
    pub name: &'static str,
    pub priority: u32,
    pub conditions: &'static [(&'static str, f64)],
    pub min_match: usize,
    pub narrative: &'static str,
}

fn pattern_library() -> Vec<Pattern> {
    vec![
        Pattern {
            name: "OOM Crisis",
            priority: 100,
            conditions: &[("mem.oom.kills", 0.35)],
            min_match: 1,
            narrative: "OOM crisis — kernel killing processes to free memory",
        },
        Pattern {
            name: "CPU Throttle Cascade",
            priority: 80,
            conditions: &[("cpu.cgroup.throttle", 0.35), ("cpu.runqueue", 0.35), ("cpu.psi", 0.35)],
            min_match: 3,
            narrative: "Cgroup CPU throttling is backing up the run queue and driving CPU pressure stall",
        },
        Pattern {
            name: "Memory-Induced IO Storm",
            priority: 70,
            conditions: &[("mem.swap.activity", 0.35), ("io.psi", 0.35)],
            min_match: 2,
            narrative: "Swapping is saturating disk IO — memory pressure is the root cause",
        },
        Pattern {
            name: "VM Noisy Neighbor",
            priority: 60,
            conditions: &[("cpu.steal", 0.35)],
            min_match: 1,
            narrative: "Hypervisor CPU steal is taking cycles from this VM — noisy neighbor on the host",
        },
    ]
}

/// Highest-priority pattern with at least `min_match` conditions fired above
/// their individual thresholds. Returns its narrative sentence.
pub fn match_pattern(evidence: &[Evidence]) -> Option<&'static str> {
    let mut patterns = pattern_library();
    patterns.sort_by(|a, b| b.priority.cmp(&a.priority));
    for pattern in &patterns {
        let matched = pattern
            .conditions
            .iter()
            .filter(|(id, min_strength)| {
                evidence.iter().any(|e| e.id == *id && e.strength >= *min_strength)
            })
            .count();
        if matched >= pattern.min_match {
            return Some(pattern.narrative);
        }
    }
    None
}

/// Fallback template used only when no pattern matches. First
/// match wins; `min_match = 0` means every listed id must have fired.
pub struct NarrativeTemplate {
    pub evidence_ids: &'static [&'static str],
    pub min_match: usize,
    pub text: &'static str,
}

fn narrative_templates() -> Vec<NarrativeTemplate> {
    vec![
        NarrativeTemplate {
            evidence_ids: &["io.disk.latency", "io.disk.util", "io.dstate"],
            min_match: 2,
            text: "Disk saturation is the dominant bottleneck",
        },
        NarrativeTemplate {
            evidence_ids: &["net.closewait", "net.tcp.retrans"],
            min_match: 1,
            text: "Network connection handling is degraded",
        },
        NarrativeTemplate {
            evidence_ids: &["mem.available.low", "mem.reclaim.direct"],
            min_match: 1,
            text: "Memory is under sustained pressure",
        },
        NarrativeTemplate {
            evidence_ids: &["cpu.psi", "cpu.runqueue"],
            min_match: 1,
            text: "CPU contention is the dominant bottleneck",
        },
    ]
}

/// First matching template's text, or `None` if nothing in the library fits.
pub fn match_narrative_template(evidence: &[Evidence]) -> Option<&'static str> {
    for template in &narrative_templates() {
        let required = if template.min_match == 0 { template.evidence_ids.len() } else { template.min_match };
        let matched = template
            .evidence_ids
            .iter()
            .filter(|id| evidence.iter().any(|e| e.id == **id && e.strength >= 0.35))
            .count();
        if matched >= required {
            return Some(template.text);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{emit, Domain};

    fn ev(id: &str, value: f64, warn: f64, crit: f64) -> Evidence {
        emit(id, Domain::Cpu, value, warn, crit, true, 0.9, format!("{id} fired"), "10s", vec![])
    }

    #[test]
    fn oom_crisis_matches_on_single_condition() {
        let evs = vec![ev("mem.oom.kills", 2.0, 1.0, 1.0)];
        assert_eq!(match_pattern(&evs), Some("OOM crisis — kernel killing processes to free memory"));
    }

    #[test]
    fn cpu_throttle_cascade_requires_all_three_conditions() {
        let evs = vec![ev("cpu.cgroup.throttle", 40.0, 5.0, 30.0), ev("cpu.runqueue", 2.0, 1.0, 3.0)];
        assert!(match_pattern(&evs).is_none());
        let evs2 = vec![
            ev("cpu.cgroup.throttle", 40.0, 5.0, 30.0),
            ev("cpu.runqueue", 2.0, 1.0, 3.0),
            ev("cpu.psi", 25.0, 2.0, 15.0),
        ];
        assert_eq!(match_pattern(&evs2), pattern_library().iter().find(|p| p.name == "CPU Throttle Cascade").map(|p| p.narrative));
    }

    #[test]
    fn noisy_neighbor_matches_on_steal_alone() {
        let evs = vec![ev("cpu.steal", 12.0, 1.0, 10.0), ev("cpu.psi", 8.0, 2.0, 15.0)];
        assert_eq!(match_pattern(&evs), Some("Hypervisor CPU steal is taking cycles from this VM — noisy neighbor on the host"));
    }

    #[test]
    fn oom_outranks_noisy_neighbor_when_both_fire() {
        let evs = vec![ev("mem.oom.kills", 1.0, 1.0, 1.0), ev("cpu.steal", 12.0, 1.0, 10.0)];
        assert_eq!(match_pattern(&evs), Some("OOM crisis — kernel killing processes to free memory"));
    }
}

//! `AnalysisResult` — the per-tick envelope produced by [`compose`]
//! out of the four domain [`RCAEntry`] results plus the correlation, anomaly
//! and DiskGuard products. Derives `Serialize` so presentation/export
//! layers can consume it as JSON without a second mapping step.

use serde::{Deserialize, Serialize};

use crate::alert::Health;
use crate::anomaly::{AnomalyTiming, DegradationWarning, ExhaustionPrediction, RecentDeploy, TopChange};
use crate::correlation::CausalDag;
use crate::model::Snapshot;
use crate::rates::{MountState, RateSnapshot};
use crate::scorers::RCAEntry;

/// Remaining capacity across the handful of resources worth headlining.
/// Memory/disk/fd/conntrack are "percent still free"; cpu is "percent not
/// busy" — all direction "bigger is healthier" to keep the struct uniform.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Headroom {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub disk_pct: f64,
    pub fd_pct: f64,
    pub conntrack_pct: f64,
}

pub fn compute_headroom(snap: &Snapshot, rates: &RateSnapshot) -> Headroom {
    let memory_pct =
        if snap.mem.total > 0 { snap.mem.available as f64 / snap.mem.total as f64 * 100.0 } else { 100.0 };
    let disk_pct = rates
        .mounts
        .iter()
        .map(|m| m.free_pct)
        .fold(f64::INFINITY, f64::min);
    let fd_pct = if snap.fd.max > 0 {
        (1.0 - snap.fd.alloc as f64 / snap.fd.max as f64) * 100.0
    } else {
        100.0
    };
    let conntrack_pct = if snap.conntrack.max > 0 {
        (1.0 - snap.conntrack.count as f64 / snap.conntrack.max as f64) * 100.0
    } else {
        100.0
    };
    Headroom {
        cpu_pct: (100.0 - rates.cpu_pct).max(0.0),
        memory_pct,
        disk_pct: if disk_pct.is_finite() { disk_pct } else { 100.0 },
        fd_pct,
        conntrack_pct,
    }
}

/// Who's responsible for the primary bottleneck, split by owner kind — a
/// flattened view of `entries[primary].top_cgroup`/`top_process` for
/// consumers that don't want to walk the entry list themselves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopOwner {
    pub domain: String,
    pub cgroup: Option<String>,
    pub process: Option<String>,
    pub pid: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskGuardSummary {
    pub worst_mount: Option<String>,
    pub worst_state: MountState,
    pub worst_eta_secs: Option<f64>,
    pub worst_free_pct: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchdogTrigger {
    pub domain: String,
    pub score: f64,
}

/// The envelope produced by one orchestrator tick once a `prev` snapshot
/// existed to derive rates from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub timestamp: i64,
    pub health: Health,
    pub confidence: f64,
    pub primary_bottleneck: Option<String>,
    pub primary_score: f64,
    pub culprit: Option<String>,
    pub entries: Vec<RCAEntry>,
    pub headroom: Headroom,
    pub top_owners: Vec<TopOwner>,
    pub warnings: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub narrative: Option<String>,
    pub narrative_bullets: Vec<String>,
    pub temporal_chain: String,
    pub causal: CausalDag,
    pub anomaly: AnomalyTiming,
    pub top_changes: Vec<TopChange>,
    pub exhaustion: Vec<ExhaustionPrediction>,
    pub degradation: Vec<DegradationWarning>,
    pub recent_deploy: Option<RecentDeploy>,
    pub disk_guard: DiskGuardSummary,
    pub watchdog: Option<WatchdogTrigger>,
    pub errors: Vec<String>,
}

/// Picks the highest-scoring domain; ties broken by `groups_fired`, then by
/// domain order (CPU < Memory < IO < Network, i.e. list order) — 
/// "Primary selection". `None` when every domain scored 0.
pub fn select_primary(entries: &[RCAEntry]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, e) in entries.iter().enumerate() {
        if e.score <= 0.0 {
            continue;
        }
        match best {
            None => best = Some(i),
            Some(bi) => {
                let b = &entries[bi];
                if e.score > b.score || (e.score == b.score && e.groups_fired > b.groups_fired) {
                    best = Some(i);
                }
            }
        }
    }
    best
}

/// Pre-state-machine health — the orchestrator feeds this and `has_crit_evidence` through
/// [`crate::alert::AlertState::update`] to fix the result's final `health`.
pub fn preliminary_health(entries: &[RCAEntry], primary_idx: Option<usize>) -> Health {
    let primary_score = primary_idx.map(|i| entries[i].score).unwrap_or(0.0);
    let any_evidence_fired = entries.iter().any(|e| e.groups_fired >= 1);
    let trust_gate_failed = primary_score <= 0.0 && any_evidence_fired;
    Health::from_primary_score(any_evidence_fired, trust_gate_failed, primary_score)
}

/// `mem.oom.kills` firing forces an instant-critical override regardless of
/// which domain ended up primary.
pub fn has_crit_evidence(entries: &[RCAEntry]) -> bool {
    entries
        .iter()
        .flat_map(|e| e.evidence.iter())
        .any(|e| e.id == "mem.oom.kills" && e.strength > 0.0)
}

fn compose_warnings(exhaustion: &[ExhaustionPrediction], degradation: &[DegradationWarning], snap_errors: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();
    for e in exhaustion {
        warnings.push(format!(
            "{} projected to exhaust in ~{:.0} min (trend {:.3}/s)",
            e.resource, e.est_minutes, e.trend_per_s
        ));
    }
    for d in degradation {
        warnings.push(format!(
            "{} {} by {:.2} {}/min over {}s",
            d.metric, d.direction, d.rate, d.unit, d.duration_s
        ));
    }
    warnings.extend(snap_errors.iter().cloned());
    warnings
}

fn compose_actions(entries: &[RCAEntry], primary_idx: Option<usize>, recent_deploy: Option<&RecentDeploy>) -> Vec<String> {
    let mut actions = Vec::new();
    if let Some(i) = primary_idx {
        let entry = &entries[i];
        if let (Some(proc), Some(pid)) = (&entry.top_process, entry.top_pid) {
            actions.push(format!(
                "Investigate process {proc} (pid {pid}), the dominant contributor to {}",
                entry.bottleneck
            ));
        } else if let Some(cg) = &entry.top_cgroup {
            actions.push(format!("Investigate cgroup {cg}, the dominant contributor to {}", entry.bottleneck));
        }
    }
    if let Some(dep) = recent_deploy {
        actions.push(format!(
            "{} (pid {}) started {:.0}s ago and correlates with this onset — consider rollback",
            dep.comm, dep.pid, dep.age_secs
        ));
    }
    actions
}

fn top_owners(entries: &[RCAEntry]) -> Vec<TopOwner> {
    entries
        .iter()
        .filter(|e| e.top_cgroup.is_some() || e.top_process.is_some())
        .map(|e| TopOwner {
            domain: e.bottleneck.clone(),
            cgroup: e.top_cgroup.clone(),
            process: e.top_process.clone(),
            pid: e.top_pid,
        })
        .collect()
}

fn disk_guard_summary(rates: &RateSnapshot) -> DiskGuardSummary {
    match rates.worst_mount() {
        Some(m) => DiskGuardSummary {
            worst_mount: Some(m.mount_point.clone()),
            worst_state: m.state,
            worst_eta_secs: m.eta_secs,
            worst_free_pct: m.free_pct,
        },
        None => DiskGuardSummary { worst_mount: None, worst_state: MountState::Ok, worst_eta_secs: None, worst_free_pct: 100.0 },
    }
}

/// Everything [`compose`] needs beyond the four scored `entries` — the
/// products that come from history/correlation and are already computed by
/// the orchestrator before it assembles the envelope.
pub struct Inputs<'a> {
    pub timestamp: i64,
    pub entries: Vec<RCAEntry>,
    pub narrative: Option<String>,
    pub narrative_bullets: Vec<String>,
    pub causal: CausalDag,
    pub temporal_chain: String,
    pub anomaly: AnomalyTiming,
    pub top_changes: Vec<TopChange>,
    pub exhaustion: Vec<ExhaustionPrediction>,
    pub degradation: Vec<DegradationWarning>,
    pub recent_deploy: Option<RecentDeploy>,
    pub snap: &'a Snapshot,
    pub rates: &'a RateSnapshot,
    pub watchdog: Option<WatchdogTrigger>,
}

/// Assembles one tick's `AnalysisResult`. `health` is filled in by the
/// caller afterward via the alert state machine — this
/// function only fixes the *preliminary* one so the event detector and
/// alert machine can be driven off the same value before it's finalized.
pub fn compose(inputs: Inputs) -> AnalysisResult {
    let Inputs {
        timestamp,
        entries,
        narrative,
        narrative_bullets,
        causal,
        temporal_chain,
        anomaly,
        top_changes,
        exhaustion,
        degradation,
        recent_deploy,
        snap,
        rates,
        watchdog,
    } = inputs;

    let primary_idx = select_primary(&entries);
    let health = preliminary_health(&entries, primary_idx);
    let (primary_bottleneck, primary_score, culprit, confidence) = match primary_idx {
        Some(i) => {
            let e = &entries[i];
            let culprit = e.top_process.clone().or_else(|| e.top_cgroup.clone());
            (Some(e.bottleneck.clone()), e.score, culprit, e.confidence)
        }
        None => (None, 0.0, None, 0.0),
    };

    let warnings = compose_warnings(&exhaustion, &degradation, &snap.errors);
    let suggested_actions = compose_actions(&entries, primary_idx, recent_deploy.as_ref());
    let owners = top_owners(&entries);
    let headroom = compute_headroom(snap, rates);
    let disk_guard = disk_guard_summary(rates);

    AnalysisResult {
        timestamp,
        health,
        confidence,
        primary_bottleneck,
        primary_score,
        culprit,
        entries,
        headroom,
        top_owners: owners,
        warnings,
        suggested_actions,
        narrative,
        narrative_bullets,
        temporal_chain,
        causal,
        anomaly,
        top_changes,
        exhaustion,
        degradation,
        recent_deploy,
        disk_guard,
        watchdog,
        errors: snap.errors.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{emit, Domain};

    fn entry(bottleneck: &str, score: f64, groups_fired: usize) -> RCAEntry {
        RCAEntry {
            bottleneck: bottleneck.to_string(),
            score,
            groups_fired,
            top_cgroup: None,
            top_process: None,
            top_pid: None,
            evidence: vec![],
            confidence: 0.5,
            narrative_chain: vec![],
        }
    }

    #[test]
    fn select_primary_prefers_highest_score() {
        let entries = vec![entry("CPU", 10.0, 2), entry("IO", 70.0, 2)];
        assert_eq!(select_primary(&entries), Some(1));
    }

    #[test]
    fn select_primary_breaks_ties_by_earlier_domain() {
        let entries = vec![entry("CPU", 50.0, 2), entry("Memory", 50.0, 2)];
        assert_eq!(select_primary(&entries), Some(0));
    }

    #[test]
    fn select_primary_none_when_all_zero() {
        let entries = vec![entry("CPU", 0.0, 0), entry("IO", 0.0, 1)];
        assert_eq!(select_primary(&entries), None);
    }

    #[test]
    fn has_crit_evidence_detects_firing_oom_kill() {
        let mut e = entry("Memory", 80.0, 2);
        e.evidence.push(emit("mem.oom.kills", Domain::Memory, 2.0, 1.0, 1.0, true, 0.95, "oom", "1t", vec![]));
        assert!(has_crit_evidence(&[e]));
    }

    #[test]
    fn preliminary_health_is_inconclusive_when_gate_fails_but_evidence_fired() {
        let entries = vec![entry("CPU", 0.0, 2)];
        assert_eq!(preliminary_health(&entries, select_primary(&entries)), Health::Inconclusive);
    }
}

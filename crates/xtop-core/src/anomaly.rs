//! Anomaly & trend tracking (C6): onset stamping, top-change
//! ranking by z-score, exhaustion ETA, slow-degradation detection, and
//! deployment correlation.

use serde::{Deserialize, Serialize};


/// Carried inside [`crate::history::History`]; mutated once per tick by
/// [`AnomalyState::update`].
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AnomalyState {
    pub primary_bottleneck: Option<String>,
    pub primary_start: Option<i64>,
    pub primary_trigger: Option<String>,
    pub culprit_name: Option<String>,
    pub culprit_start: Option<i64>,
    pub stable_start: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnomalyTiming {
    pub anomaly_started_ago: Option<i64>,
    pub culprit_since_ago: Option<i64>,
    pub stable_since: Option<i64>,
}

impl AnomalyState {
    /// `now` and the current primary bottleneck name/culprit/health are
    /// supplied by the orchestrator each tick; `trigger` is the label of the
    /// first evidence id that pushed the score above zero.
    pub fn update(
        &mut self,
        now: i64,
        primary_bottleneck: Option<&str>,
        trigger: Option<&str>,
        culprit: Option<&str>,
        is_ok: bool,
    ) -> AnomalyTiming {
        match (primary_bottleneck, &self.primary_bottleneck) {
            (Some(name), Some(last)) if name == last => {}
            (Some(name), _) => {
                self.primary_bottleneck = Some(name.to_string());
                self.primary_start = Some(now);
                self.primary_trigger = trigger.map(|t| t.to_string());
            }
            (None, _) => {
                self.primary_bottleneck = None;
                self.primary_start = None;
                self.primary_trigger = None;
            }
        }

        match (culprit, &self.culprit_name) {
            (Some(name), Some(last)) if name == last => {}
            (Some(name), _) => {
                self.culprit_name = Some(name.to_string());
                self.culprit_start = Some(now);
            }
            (None, _) => {
                self.culprit_name = None;
                self.culprit_start = None;
            }
        }

        if is_ok {
            if self.stable_start.is_none() {
                self.stable_start = Some(now);
            }
        } else {
            self.stable_start = None;
        }

        AnomalyTiming {
            anomaly_started_ago: self.primary_start.map(|t| now - t),
            culprit_since_ago: self.culprit_start.map(|t| now - t),
            stable_since: self.stable_start.map(|t| now - t),
        }
    }
}

/// One entry in the "what changed" ranking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopChange {
    pub name: String,
    pub before: f64,
    pub after: f64,
    pub delta_pct: f64,
    pub rising: bool,
    pub z_score: f64,
}

struct Candidate {
    name: String,
    before: f64,
    after: f64,
}

fn delta_pct(before: f64, after: f64) -> f64 {
    if before.abs() < 1e-9 {
        if after.abs() < 1e-9 { 0.0 } else { 100.0 }
    } else {
        (after - before) / before.abs() * 100.0
    }
}

/// Population standard deviation via `E[x^2] - E[x]^2`, floored at 0 (spec
/// a population, not sample, standard deviation).
fn population_stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let mean_sq = values.iter().map(|v| v * v).sum::<f64>() / n;
    (mean_sq - mean * mean).max(0.0).sqrt()
}

/// Process-level aggregate used as input to [`top_changes`]: total CPU% and
/// IO MB/s per `comm`, summed across pids.
#[derive(Clone, Debug)]
pub struct ProcessAggregate {
    pub comm: String,
    pub cpu_pct: f64,
    pub io_mb_s: f64,
    /// Seen 30s ago at all (controls "NEW" detection).
    pub present_before: bool,
}

const MIN_CPU_PCT: f64 = 20.0;
const MIN_IO_MB_S: f64 = 1.0;
const NEW_PROC_CPU_PCT: f64 = 5.0;
const NEW_PROC_IO_MB_S: f64 = 1.0;
const TOP_CHANGES_LIMIT: usize = 7;

/// System-level "before" snapshot of the handful of scalar metrics tracked
/// for change ranking.
#[derive(Clone, Debug, Default)]
pub struct SystemChangeInputs {
    pub cpu_psi: f64,
    pub mem_psi_full: f64,
    pub io_psi_full: f64,
    pub mem_used_pct: f64,
    pub runqueue_per_cpu: f64,
    pub swap_in_mb_s: f64,
    pub retrans_rate: f64,
    pub ctxswitch_rate: f64,
    pub worst_disk_await_ms: f64,
    pub net_drops_pps: f64,
    pub close_wait_count: f64,
}

/// Ranks system + per-process changes between a 30s-ago baseline and now
///.
pub fn top_changes(
    before: &SystemChangeInputs,
    after: &SystemChangeInputs,
    before_procs: &[ProcessAggregate],
    after_procs: &[ProcessAggregate],
) -> Vec<TopChange> {
    let mut candidates: Vec<Candidate> = vec![
        Candidate { name: "CPU PSI".into(), before: before.cpu_psi, after: after.cpu_psi },
        Candidate { name: "Memory PSI (full)".into(), before: before.mem_psi_full, after: after.mem_psi_full },
        Candidate { name: "IO PSI (full)".into(), before: before.io_psi_full, after: after.io_psi_full },
        Candidate { name: "Memory used%".into(), before: before.mem_used_pct, after: after.mem_used_pct },
        Candidate { name: "Run queue/core".into(), before: before.runqueue_per_cpu, after: after.runqueue_per_cpu },
        Candidate { name: "Swap-in MB/s".into(), before: before.swap_in_mb_s, after: after.swap_in_mb_s },
        Candidate { name: "TCP retransmits/s".into(), before: before.retrans_rate, after: after.retrans_rate },
        Candidate { name: "Context switches/s".into(), before: before.ctxswitch_rate, after: after.ctxswitch_rate },
        Candidate { name: "Worst disk await ms".into(), before: before.worst_disk_await_ms, after: after.worst_disk_await_ms },
        Candidate { name: "Network drops/s".into(), before: before.net_drops_pps, after: after.net_drops_pps },
        Candidate { name: "CLOSE_WAIT".into(), before: before.close_wait_count, after: after.close_wait_count },
    ];

    let before_by_comm: std::collections::HashMap<&str, &ProcessAggregate> =
        before_procs.iter().map(|p| (p.comm.as_str(), p)).collect();

    for proc in after_procs {
        let prior = before_by_comm.get(proc.comm.as_str());
        let is_new = !proc.present_before
            && prior.is_none()
            && (proc.cpu_pct > NEW_PROC_CPU_PCT || proc.io_mb_s > NEW_PROC_IO_MB_S);

        if is_new {
            candidates.push(Candidate { name: format!("{} (NEW)", proc.comm), before: 0.0, after: 1.0 });
            continue;
        }

        let (before_cpu, before_io) = prior.map(|p| (p.cpu_pct, p.io_mb_s)).unwrap_or((0.0, 0.0));
        if proc.cpu_pct >= MIN_CPU_PCT || before_cpu >= MIN_CPU_PCT {
            candidates.push(Candidate {
                name: format!("{} CPU%", proc.comm),
                before: before_cpu,
                after: proc.cpu_pct,
            });
        }
        if proc.io_mb_s >= MIN_IO_MB_S || before_io >= MIN_IO_MB_S {
            candidates.push(Candidate {
                name: format!("{} IO MB/s", proc.comm),
                before: before_io,
                after: proc.io_mb_s,
            });
        }
    }

    let deltas: Vec<f64> = candidates.iter().map(|c| delta_pct(c.before, c.after).abs()).collect();
    if deltas.is_empty() {
        return Vec::new();
    }
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    let stddev = population_stddev(&deltas);

    let mut ranked: Vec<TopChange> = candidates
        .into_iter()
        .zip(deltas)
        .map(|(c, abs_delta)| {
            let z = if stddev > 0.0 { (abs_delta - mean) / stddev } else { 0.0 };
            TopChange {
                rising: c.after >= c.before,
                delta_pct: delta_pct(c.before, c.after),
                name: c.name,
                before: c.before,
                after: c.after,
                z_score: z,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.z_score
            .partial_cmp(&a.z_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.delta_pct.abs().partial_cmp(&a.delta_pct.abs()).unwrap())
    });
    ranked.dedup_by(|a, b| a.name == b.name);
    ranked.truncate(TOP_CHANGES_LIMIT);
    ranked
}

/// Resource exhaustion prediction output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExhaustionPrediction {
    pub resource: String,
    pub current_pct: f64,
    pub trend_per_s: f64,
    pub est_minutes: f64,
}

const EXHAUSTION_WINDOW: usize = 60;
const EXHAUSTION_MIN_SAMPLES: usize = 30;

/// Linear trend of `samples` (equally spaced, one per tick) via simple
/// least-squares slope. `samples[0]` is oldest.
fn linear_slope_per_sample(samples: &[f64]) -> f64 {
    let n = samples.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..samples.len()).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = samples.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in xs.iter().zip(samples) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean) * (x - x_mean);
    }
    if den.abs() < 1e-12 { 0.0 } else { num / den }
}

/// Evaluates one exhaustion candidate: `pct_used_history` is up to the last
/// [`EXHAUSTION_WINDOW`] samples of "percent used" (ascending by time),
/// `tick_interval_secs` converts sample index to seconds, `limit_minutes`
/// is 60 normally, 120 for disk mounts.
pub fn predict_exhaustion(
    resource: &str,
    pct_used_history: &[f64],
    tick_interval_secs: f64,
    limit_minutes: f64,
) -> Option<ExhaustionPrediction> {
    if pct_used_history.len() < EXHAUSTION_MIN_SAMPLES {
        return None;
    }
    let window: Vec<f64> = pct_used_history
        .iter()
        .rev()
        .take(EXHAUSTION_WINDOW)
        .rev()
        .copied()
        .collect();
    let slope_per_sample = linear_slope_per_sample(&window);
    if slope_per_sample <= 0.0 {
        return None;
    }
    let trend_per_s = slope_per_sample / tick_interval_secs.max(0.001);
    let current_pct = *pct_used_history.last().unwrap();
    let remaining_pct = (100.0 - current_pct).max(0.0);
    let est_minutes = remaining_pct / trend_per_s / 60.0;
    if est_minutes < limit_minutes {
        Some(ExhaustionPrediction { resource: resource.to_string(), current_pct, trend_per_s, est_minutes })
    } else {
        None
    }
}

/// Slow degradation warning output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DegradationWarning {
    pub metric: String,
    pub direction: String,
    pub duration_s: i64,
    pub rate: f64,
    pub unit: String,
}

const DEGRADATION_MIN_SAMPLES: usize = 300;

struct DegradationRule {
    metric: &'static str,
    unit: &'static str,
    abs_floor: f64,
    rate_per_min_floor: f64,
}

const DEGRADATION_RULES: &[DegradationRule] = &[
    DegradationRule { metric: "io.disk.latency", unit: "ms", abs_floor: 20.0, rate_per_min_floor: 1.0 },
    DegradationRule { metric: "mem.available.low", unit: "pct", abs_floor: 5.0, rate_per_min_floor: 0.5 },
    DegradationRule { metric: "mem.swap.activity", unit: "pct", abs_floor: 2.0, rate_per_min_floor: 0.2 },
    DegradationRule { metric: "net.tcp.retrans", unit: "per_s", abs_floor: 0.2, rate_per_min_floor: 0.05 },
];

/// Evaluates slow degradation for one metric's sample window (oldest first),
/// `tick_interval_secs` apart.
pub fn detect_degradation(metric: &str, samples: &[f64], tick_interval_secs: f64) -> Option<DegradationWarning> {
    if samples.len() < DEGRADATION_MIN_SAMPLES {
        return None;
    }
    let rule = DEGRADATION_RULES.iter().find(|r| r.metric == metric)?;
    let first = *samples.first().unwrap();
    let last = *samples.last().unwrap();
    let delta = last - first;
    if delta.abs() < rule.abs_floor {
        return None;
    }
    let duration_s = (samples.len() as f64 - 1.0) * tick_interval_secs;
    let rate_per_min = delta / (duration_s / 60.0).max(1e-9);
    if rate_per_min.abs() < rule.rate_per_min_floor {
        return None;
    }
    Some(DegradationWarning {
        metric: metric.to_string(),
        direction: if delta > 0.0 { "rising".into() } else { "falling".into() },
        duration_s: duration_s.round() as i64,
        rate: rate_per_min,
        unit: rule.unit.to_string(),
    })
}

/// Deployment correlation output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecentDeploy {
    pub comm: String,
    pub pid: u32,
    pub age_secs: f64,
}

const DEPLOY_WINDOW_SECS: f64 = 120.0;
const DEPLOY_MIN_AGE: f64 = 2.0;
const DEPLOY_MAX_AGE: f64 = 300.0;

/// `candidates` are `(comm, pid, age_secs, is_kernel_thread)` for all live
/// processes; only called within `DEPLOY_WINDOW_SECS` of a new primary
/// bottleneck onset.
pub fn find_recent_deploy(
    time_since_bottleneck_onset: f64,
    candidates: &[(String, u32, f64, bool)],
) -> Option<RecentDeploy> {
    if time_since_bottleneck_onset > DEPLOY_WINDOW_SECS {
        return None;
    }
    candidates
        .iter()
        .filter(|(_, _, age, is_kernel)| !is_kernel && (DEPLOY_MIN_AGE..=DEPLOY_MAX_AGE).contains(age))
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
        .map(|(comm, pid, age, _)| RecentDeploy { comm: comm.clone(), pid: *pid, age_secs: *age })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_state_tracks_onset_and_resets_on_change() {
        let mut s = AnomalyState::default();
        let t1 = s.update(100, Some("IO"), Some("io.psi"), Some("svc-a"), false);
        assert_eq!(t1.anomaly_started_ago, Some(0));
        let t2 = s.update(110, Some("IO"), Some("io.psi"), Some("svc-a"), false);
        assert_eq!(t2.anomaly_started_ago, Some(10));
        let t3 = s.update(120, Some("CPU"), Some("cpu.psi"), Some("svc-b"), false);
        assert_eq!(t3.anomaly_started_ago, Some(0));
    }

    #[test]
    fn stable_since_tracks_continuous_ok() {
        let mut s = AnomalyState::default();
        let t1 = s.update(100, None, None, None, true);
        assert_eq!(t1.stable_since, Some(0));
        let t2 = s.update(200, None, None, None, true);
        assert_eq!(t2.stable_since, Some(100));
        let t3 = s.update(210, Some("IO"), None, None, false);
        assert_eq!(t3.stable_since, None);
    }

    #[test]
    fn new_process_detection_flags_with_delta_100() {
        let before = SystemChangeInputs::default();
        let after = SystemChangeInputs::default();
        let after_procs = vec![ProcessAggregate {
            comm: "spike".into(),
            cpu_pct: 40.0,
            io_mb_s: 0.0,
            present_before: false,
        }];
        let changes = top_changes(&before, &after, &[], &after_procs);
        assert!(changes.iter().any(|c| c.name == "spike (NEW)" && c.delta_pct == 100.0));
    }

    #[test]
    fn exhaustion_needs_minimum_samples() {
        let samples: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!(predict_exhaustion("FD", &samples, 1.0, 60.0).is_none());
    }

    #[test]
    fn exhaustion_predicts_when_trend_positive_and_soon() {
        let samples: Vec<f64> = (0..40).map(|i| 50.0 + i as f64 * 1.2).collect();
        let pred = predict_exhaustion("CLOSE_WAIT sockets", &samples, 1.0, 120.0).unwrap();
        assert!(pred.trend_per_s > 0.0);
        assert!(pred.est_minutes < 120.0);
    }

    #[test]
    fn degradation_requires_sample_floor() {
        let samples = vec![10.0; 10];
        assert!(detect_degradation("io.disk.latency", &samples, 1.0).is_none());
    }

    #[test]
    fn degradation_detects_rising_latency() {
        let mut samples = vec![10.0; 300];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = 10.0 + i as f64 * 0.5;
        }
        let warn = detect_degradation("io.disk.latency", &samples, 1.0).unwrap();
        assert_eq!(warn.direction, "rising");
    }

    #[test]
    fn recent_deploy_picks_smallest_age_in_range() {
        let candidates = vec![
            ("old".to_string(), 1u32, 400.0, false),
            ("fresh".to_string(), 2u32, 10.0, false),
            ("kthreadd".to_string(), 3u32, 5.0, true),
        ];
        let d = find_recent_deploy(50.0, &candidates).unwrap();
        assert_eq!(d.comm, "fresh");
    }
}

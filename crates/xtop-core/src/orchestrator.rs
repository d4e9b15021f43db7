//! Orchestrator — the single exclusive-writer tick loop that
//! wires every other component together. One `Mutex`-guarded step function
//! called once per interval, never re-entered concurrently.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::alert::Health;
use crate::analysis::{self, AnalysisResult, Inputs as AnalysisInputs, WatchdogTrigger};
use crate::anomaly::{
    detect_degradation, find_recent_deploy, predict_exhaustion, top_changes, DegradationWarning,
    ExhaustionPrediction, ProcessAggregate, RecentDeploy, SystemChangeInputs,
};
use crate::collector::CollectorRegistry;
use crate::config::Config;
use crate::correlation::correlate;
use crate::diskguard::DiskGuard;
use crate::errors::CollectError;
use crate::events::{Event, EventDetector, EventLogWriter, EventTickInput};
use crate::evidence::Evidence;
use crate::history::History;
use crate::model::Snapshot;
use crate::probe::manager::ProbeManager;
use crate::probe::sentinel::SentinelManager;
use crate::probe::Probe;
use crate::rates::{compute_rates, NoProcFsProbe, ProcFsProbe, RateSnapshot};
use crate::scorers::cpu::CpuScorer;
use crate::scorers::io::IoScorer;
use crate::scorers::memory::MemoryScorer;
use crate::scorers::network::NetworkScorer;
use crate::scorers::{RCAEntry, Scorer};

const WATCHDOG_SCORE_THRESHOLD: f64 = 50.0;
const WATCHDOG_COOLDOWN_SECS: i64 = 60;
const EXHAUSTION_LIMIT_MINUTES: f64 = 60.0;
const DISK_EXHAUSTION_LIMIT_MINUTES: f64 = 120.0;
const DEGRADATION_METRIC_IDS: &[&str] =
    &["io.disk.latency", "mem.available.low", "mem.swap.activity", "net.tcp.retrans"];

/// What one [`Orchestrator::tick`] call produces. `rates`/`result` are `None`
/// on the very first tick, before a `prev` snapshot exists to derive rates
/// from.
pub struct TickOutcome {
    pub snapshot: Snapshot,
    pub rates: Option<RateSnapshot>,
    pub result: Option<AnalysisResult>,
    pub closed_event: Option<Event>,
}

fn is_kernel_thread(comm: &str) -> bool {
    comm.starts_with('[') && comm.ends_with(']')
}

/// Drives one scheduler tick end to end. Owns every piece of mutable state a
/// tick touches except `History`'s own internals, which it mutates through
/// `History`'s public API.
pub struct Orchestrator {
    history: History,
    collectors: CollectorRegistry,
    config: Config,
    interval_secs: f64,
    disk_guard: Mutex<DiskGuard>,
    scorers: Vec<Box<dyn Scorer>>,
    event_detector: Mutex<EventDetector>,
    event_log: Mutex<Box<dyn EventLogWriter>>,
    probe_manager: ProbeManager,
    sentinel: Mutex<SentinelManager>,
    fs_probe: Box<dyn ProcFsProbe>,
    probe_factory: Box<dyn Fn() -> Vec<Box<dyn Probe>> + Send + Sync>,
    last_watchdog_at: Mutex<Option<i64>>,
    process_first_seen: Mutex<HashMap<u32, i64>>,
    tick_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        collectors: CollectorRegistry,
        config: Config,
        event_log: Box<dyn EventLogWriter>,
        self_pid: u32,
    ) -> Self {
        let interval_secs = config.interval_sec as f64;
        Self {
            history: History::new(config.history_size, interval_secs),
            collectors,
            config,
            interval_secs,
            disk_guard: Mutex::new(DiskGuard::new()),
            scorers: vec![
                Box::new(CpuScorer),
                Box::new(MemoryScorer),
                Box::new(IoScorer),
                Box::new(NetworkScorer),
            ],
            event_detector: Mutex::new(EventDetector::new()),
            event_log: Mutex::new(event_log),
            probe_manager: ProbeManager::new(self_pid),
            sentinel: Mutex::new(SentinelManager::new(Vec::new(), Vec::new())),
            fs_probe: Box::new(NoProcFsProbe),
            probe_factory: Box::new(Vec::new),
            last_watchdog_at: Mutex::new(None),
            process_first_seen: Mutex::new(HashMap::new()),
            tick_lock: Mutex::new(()),
        }
    }

    pub fn with_fs_probe(mut self, probe: Box<dyn ProcFsProbe>) -> Self {
        self.fs_probe = probe;
        self
    }

    pub fn with_sentinel_probes(self, rate_like: Vec<Box<dyn Probe>>, event_like: Vec<Box<dyn Probe>>) -> Self {
        *self.sentinel.lock().unwrap() = SentinelManager::new(rate_like, event_like);
        self
    }

    pub fn with_probe_factory(mut self, factory: impl Fn() -> Vec<Box<dyn Probe>> + Send + Sync + 'static) -> Self {
        self.probe_factory = Box::new(factory);
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn completed_events(&self) -> Vec<Event> {
        self.event_detector.lock().unwrap().completed().to_vec()
    }

    /// Runs one full tick. `now` is the Unix timestamp this tick
    /// began at. Returns the snapshot, derived rates (`None` on the first
    /// tick), the composed analysis (`None` alongside the rates), any event
    /// the tick closed, and the soft collector errors observed this tick.
    pub fn tick(&self, now: i64) -> (TickOutcome, Vec<CollectError>) {
        let _guard = self.tick_lock.lock().unwrap();

        let prev = self.history.latest();

        let mut snap = Snapshot { timestamp: now, ..Default::default() };
        let mut soft_errors = self.collectors.collect_all(&mut snap);

        let elapsed = prev.as_ref().map(|p| (now - p.timestamp) as f64).unwrap_or(0.0);
        self.probe_manager.tick();
        if prev.is_none() {
            self.sentinel.lock().unwrap().attach_all();
        }
        snap.sentinel = self.sentinel.lock().unwrap().tick(elapsed.max(0.0));
        if let Some(err) = self.sentinel.lock().unwrap().attach_err() {
            soft_errors.push(CollectError::Unavailable("sentinel"));
            let _ = err;
        }
        snap.errors = soft_errors.iter().map(|e| e.to_string()).collect();

        self.history.push(snap.clone());

        let Some(prev) = prev else {
            let outcome =
                TickOutcome { snapshot: snap, rates: None, result: None, closed_event: None };
            return (outcome, soft_errors);
        };

        let mut rates = compute_rates(&prev, &snap, self.fs_probe.as_ref());
        self.disk_guard.lock().unwrap().apply(&mut rates.mounts, now);
        self.history.push_rate(rates.clone());

        let entries: Vec<RCAEntry> =
            self.scorers.iter().map(|s| s.score(&snap, &rates, &self.history)).collect();
        let combined_evidence: Vec<Evidence> =
            entries.iter().flat_map(|e| e.evidence.iter().cloned()).collect();

        let firing_ids: Vec<String> = combined_evidence
            .iter()
            .filter(|e| e.strength >= 0.35)
            .map(|e| e.id.clone())
            .collect();
        let onset_entries = self.history.update_onset(now, &firing_ids);

        let correlation = correlate(&combined_evidence, &onset_entries, now);

        let primary_idx = analysis::select_primary(&entries);
        let (primary_name, culprit_name, trigger_id) = match primary_idx {
            Some(i) => {
                let e = &entries[i];
                let culprit = e.top_process.clone().or_else(|| e.top_cgroup.clone());
                let trigger = e
                    .evidence
                    .iter()
                    .filter(|ev| ev.strength >= 0.35)
                    .max_by(|a, b| (a.strength * a.confidence).partial_cmp(&(b.strength * b.confidence)).unwrap())
                    .map(|ev| ev.id.clone());
                (Some(e.bottleneck.clone()), culprit, trigger)
            }
            None => (None, None, None),
        };

        let anomaly_timing = self.history.update_anomaly(
            now,
            primary_name.as_deref(),
            trigger_id.as_deref(),
            culprit_name.as_deref(),
            primary_idx.is_none(),
        );

        let top_changes_result = self.compute_top_changes(&snap, &rates);
        let exhaustion = self.compute_exhaustion(&snap, &rates);
        let degradation = self.compute_degradation();
        let recent_deploy = self.compute_recent_deploy(&snap, now, anomaly_timing.anomaly_started_ago);

        let watchdog = self.maybe_trigger_watchdog(primary_idx.map(|i| &entries[i]), now);
        self.maybe_trigger_mount_scans(&rates);

        let mut result = analysis::compose(AnalysisInputs {
            timestamp: now,
            entries,
            narrative: correlation.narrative.clone(),
            narrative_bullets: correlation.bullets.clone(),
            causal: correlation.causal.clone(),
            temporal_chain: correlation.temporal_chain.clone(),
            anomaly: anomaly_timing,
            top_changes: top_changes_result,
            exhaustion,
            degradation,
            recent_deploy,
            snap: &snap,
            rates: &rates,
            watchdog,
        });

        let has_crit = analysis::has_crit_evidence(&result.entries);
        result.health = self.history.update_alert(result.health, has_crit);

        let causal_chain = correlation.causal.chains.join(" | ");
        let io_mb_s: f64 = rates.disks.iter().map(|d| d.read_mb_s + d.write_mb_s).sum();
        let mem_used_pct = if snap.mem.total > 0 {
            (snap.mem.total.saturating_sub(snap.mem.available)) as f64 / snap.mem.total as f64 * 100.0
        } else {
            0.0
        };

        let closed_event = self.event_detector.lock().unwrap().tick(EventTickInput {
            now,
            health: result.health,
            bottleneck: result.primary_bottleneck.as_deref(),
            score: result.primary_score,
            evidence: &result.entries.iter().flat_map(|e| e.evidence.iter().cloned()).collect::<Vec<_>>(),
            causal_chain: &causal_chain,
            culprit: result.culprit.as_deref(),
            cpu_pct: rates.cpu_pct,
            mem_pct: mem_used_pct,
            io_mb_s,
        });

        if let Some(event) = &closed_event {
            if let Err(e) = self.event_log.lock().unwrap().append(event) {
                tracing::warn!(error = %e, "failed to append event to event log");
            }
        }

        let outcome = TickOutcome {
            snapshot: snap,
            rates: Some(rates),
            result: Some(result),
            closed_event,
        };
        (outcome, soft_errors)
    }

    fn maybe_trigger_watchdog(&self, primary: Option<&RCAEntry>, now: i64) -> Option<WatchdogTrigger> {
        let entry = primary?;
        if entry.score < WATCHDOG_SCORE_THRESHOLD {
            return None;
        }
        let mut last = self.last_watchdog_at.lock().unwrap();
        if last.is_some_and(|t| now - t < WATCHDOG_COOLDOWN_SECS) {
            return None;
        }
        if self.probe_manager.state() == crate::probe::manager::ProbeState::Idle {
            let _ = self.probe_manager.start((self.probe_factory)());
            *last = Some(now);
        }
        Some(WatchdogTrigger { domain: entry.bottleneck.clone(), score: entry.score })
    }

    fn maybe_trigger_mount_scans(&self, rates: &RateSnapshot) {
        use crate::rates::MountState;
        let needs_scan = rates.mounts.iter().any(|m| m.state != MountState::Ok);
        if needs_scan {
            let _ = self.collectors.trigger_by_name("bigfiles");
            let _ = self.collectors.trigger_by_name("deleted_open");
        }
    }

    fn compute_top_changes(&self, snap: &Snapshot, rates: &RateSnapshot) -> Vec<crate::anomaly::TopChange> {
        let before_snap = self.history.at_seconds_ago(30);
        let before_rate = self.history.rate_at_seconds_ago(30);

        let after_inputs = system_change_inputs(snap, rates);
        let before_inputs = match (&before_snap, &before_rate) {
            (Some(s), Some(r)) => system_change_inputs(s, r),
            _ => after_inputs.clone(),
        };

        let before_comms: std::collections::HashSet<&str> = before_rate
            .as_ref()
            .map(|r| r.processes.iter().map(|p| p.comm.as_str()).collect())
            .unwrap_or_default();
        let before_procs: Vec<ProcessAggregate> = match &before_rate {
            Some(r) => process_aggregates(&r.processes, &before_comms),
            None => Vec::new(),
        };
        let after_procs: Vec<ProcessAggregate> = process_aggregates(&rates.processes, &before_comms);

        top_changes(&before_inputs, &after_inputs, &before_procs, &after_procs)
    }

    fn resource_history(&self, extract: impl Fn(&Snapshot, Option<&RateSnapshot>) -> f64) -> Vec<f64> {
        (0..self.history.len())
            .filter_map(|i| self.history.get(i).map(|s| extract(&s, self.history.get_rate(i).as_ref())))
            .collect()
    }

    fn compute_exhaustion(&self, _snap: &Snapshot, rates: &RateSnapshot) -> Vec<ExhaustionPrediction> {
        let mut out = Vec::new();

        let mem_history = self.resource_history(|s, _| {
            if s.mem.total > 0 { s.mem.total.saturating_sub(s.mem.available) as f64 / s.mem.total as f64 * 100.0 } else { 0.0 }
        });
        if let Some(p) = predict_exhaustion("Memory", &mem_history, self.interval_secs, EXHAUSTION_LIMIT_MINUTES) {
            out.push(p);
        }

        let fd_history = self.resource_history(|s, _| {
            if s.fd.max > 0 { s.fd.alloc as f64 / s.fd.max as f64 * 100.0 } else { 0.0 }
        });
        if let Some(p) = predict_exhaustion("File descriptors", &fd_history, self.interval_secs, EXHAUSTION_LIMIT_MINUTES) {
            out.push(p);
        }

        let conntrack_history = self.resource_history(|s, _| {
            if s.conntrack.max > 0 { s.conntrack.count as f64 / s.conntrack.max as f64 * 100.0 } else { 0.0 }
        });
        if let Some(p) = predict_exhaustion("Conntrack table", &conntrack_history, self.interval_secs, EXHAUSTION_LIMIT_MINUTES) {
            out.push(p);
        }

        if let Some(worst) = rates.worst_mount() {
            let mount_point = worst.mount_point.clone();
            let disk_history = self.resource_history(|_, r| r.and_then(|r| r.mounts.iter().find(|m| m.mount_point == mount_point)).map(|m| m.used_pct).unwrap_or(0.0));
            if let Some(p) = predict_exhaustion(&format!("Disk {mount_point}"), &disk_history, self.interval_secs, DISK_EXHAUSTION_LIMIT_MINUTES) {
                out.push(p);
            }
        }

        out
    }

    fn compute_degradation(&self) -> Vec<DegradationWarning> {
        let mut out = Vec::new();
        for id in DEGRADATION_METRIC_IDS {
            let samples = if *id == "mem.available.low" {
                self.resource_history(|s, _| {
                    if s.mem.total > 0 { s.mem.total.saturating_sub(s.mem.available) as f64 / s.mem.total as f64 * 100.0 } else { 0.0 }
                })
            } else {
                self.resource_history(|_, r| match (*id, r) {
                    ("io.disk.latency", Some(r)) => r.worst_disk_await_ms(),
                    ("mem.swap.activity", Some(r)) => r.swap_in_mb_s + r.swap_out_mb_s,
                    ("net.tcp.retrans", Some(r)) => r.tcp_retrans_rate,
                    _ => 0.0,
                })
            };
            if let Some(w) = detect_degradation(id, &samples, self.interval_secs) {
                out.push(w);
            }
        }
        out
    }

    fn compute_recent_deploy(&self, snap: &Snapshot, now: i64, anomaly_started_ago: Option<i64>) -> Option<RecentDeploy> {
        let time_since_onset = anomaly_started_ago? as f64;

        let mut seen = self.process_first_seen.lock().unwrap();
        let present: std::collections::HashSet<u32> = snap.processes.iter().map(|p| p.pid).collect();
        seen.retain(|pid, _| present.contains(pid));
        for p in &snap.processes {
            seen.entry(p.pid).or_insert(now);
        }

        let candidates: Vec<(String, u32, f64, bool)> = snap
            .processes
            .iter()
            .map(|p| {
                let age = (now - seen.get(&p.pid).copied().unwrap_or(now)) as f64;
                (p.comm.clone(), p.pid, age, is_kernel_thread(&p.comm))
            })
            .collect();

        find_recent_deploy(time_since_onset, &candidates)
    }
}

fn system_change_inputs(snap: &Snapshot, rates: &RateSnapshot) -> SystemChangeInputs {
    let ncpus = snap.cpus.iter().filter(|c| c.core_id >= 0).count().max(1) as f64;
    SystemChangeInputs {
        cpu_psi: snap.psi.cpu.some.avg10,
        mem_psi_full: snap.psi.memory.full.as_ref().map(|l| l.avg10).unwrap_or(0.0),
        io_psi_full: snap.psi.io.full.as_ref().map(|l| l.avg10).unwrap_or(0.0),
        mem_used_pct: if snap.mem.total > 0 {
            (snap.mem.total - snap.mem.available) as f64 / snap.mem.total as f64 * 100.0
        } else {
            0.0
        },
        runqueue_per_cpu: snap.load.load1 / ncpus,
        swap_in_mb_s: rates.swap_in_mb_s,
        retrans_rate: rates.tcp_retrans_rate,
        ctxswitch_rate: rates.ctxswitch_rate,
        worst_disk_await_ms: rates.worst_disk_await_ms(),
        net_drops_pps: rates.net_drops_pps,
        close_wait_count: snap.tcp_states.close_wait as f64,
    }
}

fn process_aggregates(
    processes: &[crate::rates::ProcessRate],
    before_comms: &std::collections::HashSet<&str>,
) -> Vec<ProcessAggregate> {
    processes
        .iter()
        .map(|p| ProcessAggregate {
            comm: p.comm.clone(),
            cpu_pct: p.cpu_pct,
            io_mb_s: p.read_mb_s + p.write_mb_s,
            present_before: before_comms.contains(p.comm.as_str()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockCollector;
    use crate::events::JsonlEventLog;

    fn test_orchestrator() -> Orchestrator {
        let mut collectors = CollectorRegistry::new();
        collectors.register(Box::new(MockCollector::new("noop", |_| Ok(()))));
        let dir = tempfile::tempdir().unwrap();
        let log = Box::new(JsonlEventLog::new(dir.path().join("events.jsonl"), 10 * 1024 * 1024));
        Orchestrator::new(collectors, Config { interval_sec: 1, ..Config::default() }, log, 1)
    }

    #[test]
    fn first_tick_has_no_rates_or_result() {
        let orch = test_orchestrator();
        orch.tick(100);
        assert_eq!(orch.history().len(), 1);
        assert!(orch.history().latest_rate().is_none());
    }

    #[test]
    fn second_tick_produces_rates() {
        let orch = test_orchestrator();
        orch.tick(100);
        orch.tick(101);
        assert_eq!(orch.history().len(), 2);
        assert!(orch.history().latest_rate().is_some());
    }

    #[test]
    fn idle_system_stays_healthy_across_ticks() {
        let orch = test_orchestrator();
        for t in 0..5 {
            orch.tick(100 + t);
        }
        assert_eq!(orch.history().len(), 5);
    }

    struct StubSentinelProbe {
        name: &'static str,
        attached: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl crate::probe::Probe for StubSentinelProbe {
        fn name(&self) -> &'static str {
            self.name
        }
        fn attach(&mut self) -> Result<(), crate::errors::ProbeAttachError> {
            self.attached.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        fn read(&mut self) -> Vec<crate::probe::RawSample> {
            vec![crate::probe::RawSample { key: "oom".into(), value: 1.0, tags: Default::default() }]
        }
        fn close(&mut self) {}
    }

    #[test]
    fn first_tick_attaches_sentinel_probes_and_second_tick_reads_them() {
        let attached = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let orch = test_orchestrator().with_sentinel_probes(
            vec![],
            vec![Box::new(StubSentinelProbe { name: "oom_kill", attached: attached.clone() })],
        );

        assert!(!attached.load(std::sync::atomic::Ordering::SeqCst));
        let (first, _) = orch.tick(100);
        assert!(attached.load(std::sync::atomic::Ordering::SeqCst));
        // No elapsed time yet on the first tick, so the sentinel hasn't read anything.
        assert_eq!(first.snapshot.sentinel.oom_kills, 0);

        let (second, _) = orch.tick(101);
        assert_eq!(second.snapshot.sentinel.oom_kills, 1);
    }
}

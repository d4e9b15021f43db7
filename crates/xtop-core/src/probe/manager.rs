//! On-demand deep-dive probes. `Start(pack)` spawns a cooperative
//! `std::thread` worker gated by a plain `AtomicBool`, rather than reaching
//! for an async runtime this daemon doesn't otherwise need.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{Finding, Probe};

const RUN_DURATION: Duration = Duration::from_secs(10);
const DONE_EXPIRY: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Running,
    Done,
}

pub struct ProbeRun {
    pub findings: Vec<Finding>,
    pub errors: Vec<String>,
    pub started_at: Instant,
    pub done_at: Option<Instant>,
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<ProbeRun>,
}

/// Off-CPU filter: drop self, pid<100, kernel threads, count<10; `>90%` off
/// with `<100` switches is idle-timer noise.
pub fn keep_offcpu_finding(pid: u32, comm: &str, pct: f64, switches: u64, self_pid: u32) -> bool {
    if pid == self_pid || pid < 100 || is_kernel_thread(comm) || switches < 10 {
        return false;
    }
    !(pct > 90.0 && switches < 100)
}

/// Lock-wait filter: drop self, pid<100; drop `avg_wait>100ms && count<100`
/// (idle event wait); drop entries under 0.1% of the probe duration.
pub fn keep_lockwait_finding(pid: u32, avg_wait_ms: f64, count: u64, self_pid: u32, probe_duration: Duration) -> bool {
    if pid == self_pid || pid < 100 {
        return false;
    }
    if avg_wait_ms > 100.0 && count < 100 {
        return false;
    }
    let total_wait_ms = avg_wait_ms * count as f64;
    total_wait_ms >= probe_duration.as_millis() as f64 * 0.001
}

fn is_kernel_thread(comm: &str) -> bool {
    comm.starts_with('[') && comm.ends_with(']')
}

/// State machine driving one on-demand probe run. `Idle -> Running -> Done
/// -> Idle` (the last transition happens after `DONE_EXPIRY` has elapsed).
pub struct ProbeManager {
    worker: Mutex<Option<Worker>>,
    last_run: Mutex<Option<ProbeRun>>,
    self_pid: u32,
}

impl ProbeManager {
    pub fn new(self_pid: u32) -> Self {
        Self { worker: Mutex::new(None), last_run: Mutex::new(None), self_pid }
    }

    pub fn state(&self) -> ProbeState {
        if self.worker.lock().unwrap().is_some() {
            return ProbeState::Running;
        }
        if self.last_run.lock().unwrap().is_some() {
            return ProbeState::Done;
        }
        ProbeState::Idle
    }

    /// Refuses to start a second run while one is already `Running`.
    /// Spawns the worker thread, attaches every requested probe
    /// independently (collecting attach errors rather than aborting),
    /// sleeps cooperatively for `RUN_DURATION`, then drains and filters.
    pub fn start(&self, mut probes: Vec<Box<dyn Probe>>) -> Result<(), &'static str> {
        let mut worker_slot = self.worker.lock().unwrap();
        if worker_slot.is_some() {
            return Err("probe run already in progress");
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_worker = cancel.clone();
        let self_pid = self.self_pid;

        let handle = std::thread::spawn(move || {
            let started_at = Instant::now();
            let mut errors = Vec::new();
            probes.retain_mut(|probe| match probe.attach() {
                Ok(()) => true,
                Err(e) => {
                    errors.push(format!("{}: {e}", probe.name()));
                    false
                }
            });

            let deadline = started_at + RUN_DURATION;
            while Instant::now() < deadline && !cancel_worker.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }

            let mut findings = Vec::new();
            for probe in probes.iter_mut() {
                let samples = probe.read();
                findings.extend(samples_to_findings(probe.name(), &samples, self_pid));
                probe.close();
            }

            ProbeRun { findings, errors, started_at, done_at: Some(Instant::now()) }
        });

        *worker_slot = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Called once per tick: reaps a finished worker into `last_run`, and
    /// expires a `Done` result back to `Idle` after `DONE_EXPIRY`.
    pub fn tick(&self) {
        let mut worker_slot = self.worker.lock().unwrap();
        if let Some(worker) = worker_slot.take() {
            if worker.handle.is_finished() {
                if let Ok(run) = worker.handle.join() {
                    *self.last_run.lock().unwrap() = Some(run);
                }
            } else {
                *worker_slot = Some(worker);
                return;
            }
        }
        drop(worker_slot);

        let mut last_run = self.last_run.lock().unwrap();
        if let Some(run) = last_run.as_ref() {
            if let Some(done_at) = run.done_at {
                if done_at.elapsed() >= DONE_EXPIRY {
                    *last_run = None;
                }
            }
        }
    }

    pub fn cancel(&self) {
        if let Some(worker) = self.worker.lock().unwrap().as_ref() {
            worker.cancel.store(true, Ordering::Relaxed);
        }
    }
}

/// RawSample -> Finding conversion, dispatched by probe name the same way
/// `sentinel::apply_rate_like`/`apply_event_like` dispatch on theirs. Each
/// arm applies the filters (`keep_offcpu_finding`, `keep_lockwait_finding`)
/// or derived stats (`histogram::percentiles`, `classify_syscall_x86_64`)
/// the spec's step 3/4 call for before building the typed `Finding`.
fn samples_to_findings(probe_name: &str, samples: &[super::RawSample], self_pid: u32) -> Vec<Finding> {
    match probe_name {
        "offcpu" => offcpu_findings(samples, self_pid),
        "lockwait" => lockwait_findings(samples, self_pid),
        "io_latency" => io_latency_findings(samples),
        "tcp_retrans" => tcp_retrans_findings(samples),
        "net_throughput" => net_throughput_findings(samples),
        "tcp_rtt" => tcp_rtt_findings(samples),
        "connect_latency" => connect_latency_findings(samples),
        "runqueue_latency" => runqueue_latency_findings(samples),
        "writeback_stall" => writeback_stall_findings(samples),
        "pagefault_latency" => pagefault_latency_findings(samples),
        "swap_evict" => swap_evict_findings(samples),
        "syscall_dissect" => syscall_dissect_findings(samples),
        "socket_io" => socket_io_findings(samples),
        _ => Vec::new(),
    }
}

fn tag<'a>(sample: &'a super::RawSample, name: &str) -> &'a str {
    sample.tags.get(name).map(String::as_str).unwrap_or("")
}

fn offcpu_findings(samples: &[super::RawSample], self_pid: u32) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            let switches: u64 = tag(s, "switches").parse().unwrap_or(0);
            let pct = s.value;
            if !keep_offcpu_finding(pid, comm, pct, switches, self_pid) {
                return None;
            }
            Some(Finding::OffCpu { pid, comm: comm.to_string(), pct, switches })
        })
        .collect()
}

fn lockwait_findings(samples: &[super::RawSample], self_pid: u32) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            let count: u64 = tag(s, "count").parse().unwrap_or(0);
            let avg_wait_ms = s.value;
            if !keep_lockwait_finding(pid, avg_wait_ms, count, self_pid, RUN_DURATION) {
                return None;
            }
            Some(Finding::LockWaiter { pid, comm: comm.to_string(), avg_wait_ms, count })
        })
        .collect()
}

/// Samples are one per `(device, log2-bucket)`, keyed `"<bucket>"` and
/// tagged with `device`; grouped back into a per-device bucket vector before
/// `histogram::percentiles` turns the counts into p50/p95/p99.
fn io_latency_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    use std::collections::HashMap;
    let mut by_device: HashMap<&str, Vec<(usize, u64)>> = HashMap::new();
    for s in samples {
        let device = tag(s, "device");
        let Ok(bucket) = s.key.parse::<usize>() else { continue };
        by_device.entry(device).or_default().push((bucket, s.value as u64));
    }
    by_device
        .into_iter()
        .map(|(device, entries)| {
            let max_bucket = entries.iter().map(|(b, _)| *b).max().unwrap_or(0);
            let mut buckets = vec![0u64; max_bucket + 1];
            for (b, c) in entries {
                buckets[b] += c;
            }
            let p = super::histogram::percentiles(&buckets);
            Finding::IoLatency { device: device.to_string(), p50_ns: p.p50_ns, p95_ns: p.p95_ns, p99_ns: p.p99_ns }
        })
        .collect()
}

fn tcp_retrans_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            let dest = tag(s, "dest");
            Some(Finding::TcpRetransmit { pid, comm: comm.to_string(), dest: dest.to_string(), count: s.value as u64 })
        })
        .collect()
}

fn net_throughput_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            Some(Finding::NetThroughput { pid, comm: comm.to_string(), mb_s: s.value })
        })
        .collect()
}

fn tcp_rtt_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples.iter().map(|s| Finding::TcpRtt { dest: s.key.clone(), avg_ms: s.value }).collect()
}

fn connect_latency_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples.iter().map(|s| Finding::ConnectLatency { dest: s.key.clone(), avg_ms: s.value }).collect()
}

fn runqueue_latency_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            Some(Finding::RunQueueLatency { pid, comm: comm.to_string(), avg_ms: s.value })
        })
        .collect()
}

fn writeback_stall_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples.iter().map(|s| Finding::WritebackStall { device: s.key.clone(), avg_ms: s.value }).collect()
}

fn pagefault_latency_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            Some(Finding::PageFaultLatency { pid, comm: comm.to_string(), avg_us: s.value })
        })
        .collect()
}

fn swap_evict_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            Some(Finding::SwapEvict { pid, comm: comm.to_string(), pages: s.value as u64 })
        })
        .collect()
}

/// Samples are keyed `"<pid>:<syscall_nr>"` and tagged with `comm`; grouped
/// by pid with each syscall number folded into its [`super::SyscallGroup`].
fn syscall_dissect_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    use std::collections::HashMap;
    struct Agg {
        comm: String,
        groups: HashMap<super::SyscallGroup, u64>,
    }
    let mut by_pid: HashMap<u32, Agg> = HashMap::new();
    for s in samples {
        let mut parts = s.key.splitn(2, ':');
        let Some(pid) = parts.next().and_then(|p| p.parse::<u32>().ok()) else { continue };
        let Some(nr) = parts.next().and_then(|n| n.parse::<u64>().ok()) else { continue };
        let group = super::classify_syscall_x86_64(nr);
        let agg = by_pid.entry(pid).or_insert_with(|| Agg { comm: tag(s, "comm").to_string(), groups: HashMap::new() });
        *agg.groups.entry(group).or_insert(0) += s.value as u64;
    }
    by_pid
        .into_iter()
        .map(|(pid, agg)| Finding::SyscallDissection { pid, comm: agg.comm, groups: agg.groups })
        .collect()
}

fn socket_io_findings(samples: &[super::RawSample]) -> Vec<Finding> {
    samples
        .iter()
        .filter_map(|s| {
            let pid: u32 = s.key.parse().ok()?;
            let comm = tag(s, "comm");
            let local = tag(s, "local");
            let remote = tag(s, "remote");
            Some(Finding::SocketIo {
                pid,
                comm: comm.to_string(),
                local: local.to_string(),
                remote: remote.to_string(),
                bytes_s: s.value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offcpu_filter_drops_self_pid() {
        assert!(!keep_offcpu_finding(42, "worker", 50.0, 100, 42));
    }

    #[test]
    fn offcpu_filter_drops_low_pid() {
        assert!(!keep_offcpu_finding(50, "worker", 50.0, 100, 1));
    }

    #[test]
    fn offcpu_filter_drops_kernel_threads() {
        assert!(!keep_offcpu_finding(200, "[kworker/0:1]", 50.0, 100, 1));
    }

    #[test]
    fn offcpu_filter_drops_idle_timer_noise() {
        assert!(!keep_offcpu_finding(200, "sleeper", 95.0, 50, 1));
    }

    #[test]
    fn offcpu_filter_keeps_real_contention() {
        assert!(keep_offcpu_finding(200, "worker", 80.0, 500, 1));
    }

    #[test]
    fn lockwait_filter_drops_idle_event_wait() {
        assert!(!keep_lockwait_finding(200, 150.0, 10, 1, Duration::from_secs(10)));
    }

    #[test]
    fn lockwait_filter_drops_negligible_total_wait() {
        assert!(!keep_lockwait_finding(200, 0.001, 1, 1, Duration::from_secs(10)));
    }

    #[test]
    fn lockwait_filter_keeps_significant_contention() {
        assert!(keep_lockwait_finding(200, 50.0, 200, 1, Duration::from_secs(10)));
    }

    fn sample(key: &str, value: f64, tags: &[(&str, &str)]) -> super::super::RawSample {
        super::super::RawSample {
            key: key.to_string(),
            value,
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn samples_to_findings_builds_offcpu_and_applies_filter() {
        let samples = vec![
            sample("200", 80.0, &[("comm", "worker"), ("switches", "500")]),
            sample("201", 95.0, &[("comm", "sleeper"), ("switches", "50")]),
        ];
        let findings = samples_to_findings("offcpu", &samples, 1);
        assert_eq!(findings.len(), 1);
        match &findings[0] {
            Finding::OffCpu { pid, comm, pct, switches } => {
                assert_eq!(*pid, 200);
                assert_eq!(comm, "worker");
                assert_eq!(*pct, 80.0);
                assert_eq!(*switches, 500);
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn samples_to_findings_drops_lockwait_below_filter() {
        let samples = vec![sample("200", 150.0, &[("count", "10")])];
        assert!(samples_to_findings("lockwait", &samples, 1).is_empty());
    }

    #[test]
    fn samples_to_findings_io_latency_groups_buckets_by_device() {
        let samples = vec![
            sample("0", 95.0, &[("device", "sda")]),
            sample("8", 5.0, &[("device", "sda")]),
        ];
        let findings = samples_to_findings("io_latency", &samples, 1);
        assert_eq!(findings.len(), 1);
        match &findings[0] {
            Finding::IoLatency { device, p99_ns, .. } => {
                assert_eq!(device, "sda");
                assert!(*p99_ns > 0.0);
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn samples_to_findings_syscall_dissect_groups_by_pid_and_class() {
        let samples = vec![
            sample("200:202", 10.0, &[("comm", "worker")]), // futex -> LockSync
            sample("200:0", 5.0, &[("comm", "worker")]),    // read -> Read
        ];
        let findings = samples_to_findings("syscall_dissect", &samples, 1);
        assert_eq!(findings.len(), 1);
        match &findings[0] {
            Finding::SyscallDissection { pid, comm, groups } => {
                assert_eq!(*pid, 200);
                assert_eq!(comm, "worker");
                assert_eq!(groups.get(&super::super::SyscallGroup::LockSync), Some(&10));
                assert_eq!(groups.get(&super::super::SyscallGroup::Read), Some(&5));
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn samples_to_findings_unknown_probe_yields_nothing() {
        let samples = vec![sample("1", 1.0, &[])];
        assert!(samples_to_findings("unknown_probe", &samples, 1).is_empty());
    }
}

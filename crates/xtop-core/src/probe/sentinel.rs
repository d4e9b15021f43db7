//! Always-on sentinel. Attaches best-effort on first tick, then
//! reads and diffs per-probe accumulators every subsequent tick into the
//! snapshot's [`crate::model::sentinel::SentinelData`].

use crate::errors::ProbeAttachError;
use crate::model::sentinel::{SentinelData, BENIGN_DROP_REASONS};

use super::{PrevValueMap, Probe};

/// Whether a sentinel probe reports cumulative counters (diffed against the
/// previous tick) or discrete events (read-and-clear every tick).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProbeKind {
    RateLike,
    EventLike,
}

struct Slot {
    probe: Box<dyn Probe>,
    kind: ProbeKind,
    prev: PrevValueMap,
    attached: bool,
}

pub struct SentinelManager {
    slots: Vec<Slot>,
    attach_err: Option<String>,
}

impl SentinelManager {
    pub fn new(rate_like: Vec<Box<dyn Probe>>, event_like: Vec<Box<dyn Probe>>) -> Self {
        let mut slots = Vec::new();
        slots.extend(rate_like.into_iter().map(|probe| Slot { probe, kind: ProbeKind::RateLike, prev: PrevValueMap::new(), attached: false }));
        slots.extend(event_like.into_iter().map(|probe| Slot { probe, kind: ProbeKind::EventLike, prev: PrevValueMap::new(), attached: false }));
        Self { slots, attach_err: None }
    }

    /// Attaches every probe independently; a probe that fails is marked and
    /// skipped on subsequent reads, but doesn't block the others.
    pub fn attach_all(&mut self) {
        let mut errs = Vec::new();
        for slot in &mut self.slots {
            match slot.probe.attach() {
                Ok(()) => slot.attached = true,
                Err(e) => errs.push(format!("{}: {e}", slot.probe.name())),
            }
        }
        self.attach_err = if errs.is_empty() { None } else { Some(errs.join("; ")) };
    }

    /// Reads every attached probe, diffs rate-like accumulators against the
    /// previous tick, read-and-clears event-like ones, and assembles
    /// `SentinelData` for the current snapshot.
    pub fn tick(&mut self, elapsed_secs: f64) -> SentinelData {
        let mut data = SentinelData { attach_err: self.attach_err.clone(), ..Default::default() };
        if elapsed_secs <= 0.0 {
            return data;
        }

        for slot in &mut self.slots {
            if !slot.attached {
                continue;
            }
            let samples = slot.probe.read();
            match slot.kind {
                ProbeKind::RateLike => apply_rate_like(slot.probe.name(), &samples, &mut slot.prev, elapsed_secs, &mut data),
                ProbeKind::EventLike => apply_event_like(slot.probe.name(), &samples, &mut data),
            }
        }
        data
    }

    pub fn attach_err(&self) -> Option<ProbeAttachError> {
        // Surfaced to scorers purely as presence/absence; the typed cause is
        // already folded into the joined message on `SentinelData`.
        if self.attach_err.is_some() { Some(ProbeAttachError::Load(self.attach_err.clone().unwrap())) } else { None }
    }
}

fn apply_rate_like(probe_name: &str, samples: &[super::RawSample], prev: &mut PrevValueMap, elapsed_secs: f64, data: &mut SentinelData) {
    for sample in samples {
        let delta = prev.delta(&sample.key, sample.value);
        let rate = delta / elapsed_secs;
        match probe_name {
            "pkt_drop" => {
                let reason = sample.tags.get("reason").map(String::as_str).unwrap_or("unknown");
                *data.drop_reasons.entry(reason.to_string()).or_insert(0.0) += rate;
                if !BENIGN_DROP_REASONS.contains(&reason) {
                    data.pkt_drop_rate += rate;
                }
            }
            "tcp_reset" => data.tcp_resets_rate += rate,
            "cgroup_throttle" => {
                *data.cgroup_throttle_rate.entry(sample.key.clone()).or_insert(0.0) += rate;
            }
            _ => {}
        }
    }
}

fn apply_event_like(probe_name: &str, samples: &[super::RawSample], data: &mut SentinelData) {
    let total: u32 = samples.iter().map(|s| s.value as u32).sum();
    match probe_name {
        "oom_kill" => data.oom_kills += total,
        "module_load" => data.module_loads += total,
        "exec" => data.execs += total,
        "ptrace_attach" => data.ptrace_attaches += total,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProbeAttachError as PAE;
    use crate::probe::RawSample;

    struct StubProbe {
        name: &'static str,
        should_fail: bool,
        samples: Vec<RawSample>,
    }

    impl Probe for StubProbe {
        fn name(&self) -> &'static str {
            self.name
        }
        fn attach(&mut self) -> Result<(), PAE> {
            if self.should_fail { Err(PAE::MissingBtf) } else { Ok(()) }
        }
        fn read(&mut self) -> Vec<RawSample> {
            self.samples.clone()
        }
        fn close(&mut self) {}
    }

    fn sample(key: &str, value: f64, tags: &[(&str, &str)]) -> RawSample {
        RawSample { key: key.to_string(), value, tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }
    }

    #[test]
    fn benign_drop_reasons_excluded_from_headline_rate() {
        let probe = StubProbe {
            name: "pkt_drop",
            should_fail: false,
            samples: vec![sample("eth0", 100.0, &[("reason", "TCP_ZEROWINDOW")])],
        };
        let mut mgr = SentinelManager::new(vec![Box::new(probe)], vec![]);
        mgr.attach_all();
        mgr.tick(1.0);
        let data = mgr.tick(1.0);
        assert_eq!(data.pkt_drop_rate, 0.0);
        assert!(data.drop_reasons.contains_key("TCP_ZEROWINDOW"));
    }

    #[test]
    fn non_benign_drops_counted_in_headline_rate() {
        let probe = StubProbe {
            name: "pkt_drop",
            should_fail: false,
            samples: vec![sample("eth0", 100.0, &[("reason", "SOCKET_FILTER")])],
        };
        let mut mgr = SentinelManager::new(vec![Box::new(probe)], vec![]);
        mgr.attach_all();
        let data = mgr.tick(1.0);
        assert_eq!(data.pkt_drop_rate, 100.0);
    }

    #[test]
    fn failed_attach_is_recorded_and_excludes_probe_from_reads() {
        let probe = StubProbe { name: "oom_kill", should_fail: true, samples: vec![] };
        let mut mgr = SentinelManager::new(vec![], vec![Box::new(probe)]);
        mgr.attach_all();
        let data = mgr.tick(1.0);
        assert!(data.attach_err.is_some());
        assert_eq!(data.oom_kills, 0);
    }

    #[test]
    fn event_like_probe_sums_samples_into_oom_kills() {
        let probe = StubProbe { name: "oom_kill", should_fail: false, samples: vec![sample("p1", 2.0, &[])] };
        let mut mgr = SentinelManager::new(vec![], vec![Box::new(probe)]);
        mgr.attach_all();
        let data = mgr.tick(1.0);
        assert_eq!(data.oom_kills, 2);
    }
}

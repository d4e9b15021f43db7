//! Ring History (C3) — fixed-capacity circular buffers of
//! snapshots and rates with copy-out read semantics, plus the singletons
//! that must share the ring's lifetime: the temporal onset map,
//! [`AnomalyState`] and [`AlertState`].
//!
//! One exclusive writer (the scheduler task); concurrent readers
//! go through a [`std::sync::RwLock`] and always receive owned copies.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::alert::AlertState;
use crate::anomaly::AnomalyState;
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

struct Ring {
    snapshots: VecDeque<Snapshot>,
    rates: VecDeque<Option<RateSnapshot>>,
    capacity: usize,
    onset: HashMap<String, i64>,
    anomaly_state: AnomalyState,
    alert_state: AlertState,
}

impl Ring {
    fn new(capacity: usize, interval_secs: f64) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            rates: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            onset: HashMap::new(),
            anomaly_state: AnomalyState::default(),
            alert_state: AlertState::new(interval_secs),
        }
    }
}

/// Bounded history of snapshots and rates, shared by one writer (the
/// orchestrator tick) and any number of readers.
pub struct History {
    inner: RwLock<Ring>,
}

impl History {
    pub fn new(capacity: usize, interval_secs: f64) -> Self {
        Self { inner: RwLock::new(Ring::new(capacity, interval_secs)) }
    }

    /// Pushes a new snapshot, overwriting the oldest retained one once at
    /// capacity. A `None` rate slot is reserved alongside it until
    /// [`Self::push_rate`] is called for this tick.
    pub fn push(&self, snapshot: Snapshot) {
        let mut ring = self.inner.write().unwrap();
        if ring.snapshots.len() == ring.capacity {
            ring.snapshots.pop_front();
            ring.rates.pop_front();
        }
        ring.snapshots.push_back(snapshot);
        ring.rates.push_back(None);
    }

    /// Attaches a computed rate to the slot of the most recently pushed
    /// snapshot.
    pub fn push_rate(&self, rate: RateSnapshot) {
        let mut ring = self.inner.write().unwrap();
        if let Some(slot) = ring.rates.back_mut() {
            *slot = Some(rate);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recently pushed snapshot, cloned.
    pub fn latest(&self) -> Option<Snapshot> {
        self.inner.read().unwrap().snapshots.back().cloned()
    }

    /// Second-most-recently pushed snapshot, cloned — the `prev` half of the
    /// (prev, curr) pair the rate calculator consumes.
    pub fn previous(&self) -> Option<Snapshot> {
        let ring = self.inner.read().unwrap();
        let n = ring.snapshots.len();
        if n < 2 {
            None
        } else {
            ring.snapshots.get(n - 2).cloned()
        }
    }

    /// `i = 0` is the oldest retained snapshot.
    pub fn get(&self, i: usize) -> Option<Snapshot> {
        self.inner.read().unwrap().snapshots.get(i).cloned()
    }

    /// Rate attached to slot `i`. `None` both when `i` is out of range and
    /// when no rate was ever computed for that slot (the first tick).
    pub fn get_rate(&self, i: usize) -> Option<RateSnapshot> {
        self.inner.read().unwrap().rates.get(i).and_then(|r| r.clone())
    }

    pub fn latest_rate(&self) -> Option<RateSnapshot> {
        self.inner.read().unwrap().rates.back().and_then(|r| r.clone())
    }

    /// Snapshot pushed roughly `secs_ago` seconds before the latest one,
    /// used by top-changes (30s lookback) and exhaustion windows.
    /// Returns the oldest sample if the ring doesn't span that far back.
    pub fn at_seconds_ago(&self, secs_ago: i64) -> Option<Snapshot> {
        let ring = self.inner.read().unwrap();
        let latest_ts = ring.snapshots.back()?.timestamp;
        let target = latest_ts - secs_ago;
        ring.snapshots
            .iter()
            .find(|s| s.timestamp >= target)
            .or_else(|| ring.snapshots.front())
            .cloned()
    }

    /// Rate attached to the snapshot roughly `secs_ago` seconds before the
    /// latest one (same lookback as [`Self::at_seconds_ago`]). `None` when
    /// that slot never had a rate computed (e.g. it was the first tick).
    pub fn rate_at_seconds_ago(&self, secs_ago: i64) -> Option<RateSnapshot> {
        let ring = self.inner.read().unwrap();
        let latest_ts = ring.snapshots.back()?.timestamp;
        let target = latest_ts - secs_ago;
        let idx = ring
            .snapshots
            .iter()
            .position(|s| s.timestamp >= target)
            .unwrap_or(0);
        ring.rates.get(idx).and_then(|r| r.clone())
    }

    /// All retained snapshot timestamps, oldest first.
    pub fn timestamps(&self) -> Vec<i64> {
        self.inner.read().unwrap().snapshots.iter().map(|s| s.timestamp).collect()
    }

    /// Updates the temporal onset map: marks every id in `firing_ids` as
    /// seen at `now` (preserving the earliest seen time), evicts ids not in
    /// the set. Returns the onset map's current contents, sorted by
    /// first-seen ascending.
    pub fn update_onset(&self, now: i64, firing_ids: &[String]) -> Vec<(String, i64)> {
        let mut ring = self.inner.write().unwrap();
        let firing: std::collections::HashSet<&str> = firing_ids.iter().map(|s| s.as_str()).collect();
        ring.onset.retain(|id, _| firing.contains(id.as_str()));
        for id in firing_ids {
            ring.onset.entry(id.clone()).or_insert(now);
        }
        let mut entries: Vec<(String, i64)> = ring.onset.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by_key(|(_, t)| *t);
        entries
    }

    /// Applies one tick's anomaly bookkeeping and returns the resulting
    /// timing fields for `AnalysisResult`.
    pub fn update_anomaly(
        &self,
        now: i64,
        primary_bottleneck: Option<&str>,
        trigger: Option<&str>,
        culprit: Option<&str>,
        is_ok: bool,
    ) -> crate::anomaly::AnomalyTiming {
        let mut ring = self.inner.write().unwrap();
        ring.anomaly_state.update(now, primary_bottleneck, trigger, culprit, is_ok)
    }

    /// Applies one tick's alert-state transition and returns the resulting
    /// health.
    pub fn update_alert(&self, health: crate::alert::Health, has_crit_evidence: bool) -> crate::alert::Health {
        let mut ring = self.inner.write().unwrap();
        ring.alert_state.update(health, has_crit_evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ts: i64) -> Snapshot {
        Snapshot { timestamp: ts, ..Default::default() }
    }

    #[test]
    fn get_returns_ith_oldest_among_last_min_k_cap() {
        let h = History::new(3, 1.0);
        for ts in [1, 2, 3, 4, 5] {
            h.push(snap(ts));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.get(0).unwrap().timestamp, 3);
        assert_eq!(h.get(1).unwrap().timestamp, 4);
        assert_eq!(h.get(2).unwrap().timestamp, 5);
    }

    #[test]
    fn push_does_not_mutate_previously_returned_value() {
        let h = History::new(2, 1.0);
        h.push(snap(1));
        let first = h.latest().unwrap();
        h.push(snap(2));
        assert_eq!(first.timestamp, 1);
    }

    #[test]
    fn get_rate_is_none_on_first_tick() {
        let h = History::new(4, 1.0);
        h.push(snap(1));
        assert!(h.get_rate(0).is_none());
    }

    #[test]
    fn onset_map_preserves_earliest_time_and_evicts_stale() {
        let h = History::new(4, 1.0);
        h.update_onset(100, &["io.psi".to_string()]);
        let entries = h.update_onset(110, &["io.psi".to_string(), "cpu.psi".to_string()]);
        let io = entries.iter().find(|(id, _)| id == "io.psi").unwrap();
        assert_eq!(io.1, 100);
        let entries2 = h.update_onset(120, &["cpu.psi".to_string()]);
        assert!(entries2.iter().all(|(id, _)| id != "io.psi"));
    }
}

//! DiskGuard smoothing — EWMA-smooths the raw per-mount growth
//! rate [`crate::rates::compute_rates`] fills in, then recomputes ETA and the
//! three-tier lifecycle state from the smoothed value. Owned by the
//! orchestrator; applied to a [`crate::rates::RateSnapshot`]'s mounts in
//! place, before `history.push_rate` ever sees them.

use std::collections::HashMap;

use crate::rates::{MountRate, MountState};

const ALPHA: f64 = 0.3;
const GROWTH_FLOOR_BYTES_S: f64 = 1024.0;

#[derive(Clone, Copy, Debug, Default)]
struct MountGuard {
    smoothed_bytes_s: f64,
    growth_started: Option<i64>,
}

/// Per-mount EWMA state, keyed by mount point. Lives for the process
/// lifetime, mutated only from [`Self::apply`].
#[derive(Default)]
pub struct DiskGuard {
    mounts: HashMap<String, MountGuard>,
}

impl DiskGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooths `growth_bytes_s` for every mount, recomputes `eta_secs` and
    /// `state` from the smoothed value, and drops state for mounts no longer
    /// present (unmounted or rotated out).
    pub fn apply(&mut self, mounts: &mut [MountRate], now: i64) {
        let seen: std::collections::HashSet<&str> = mounts.iter().map(|m| m.mount_point.as_str()).collect();
        self.mounts.retain(|k, _| seen.contains(k.as_str()));

        for mount in mounts.iter_mut() {
            let guard = self.mounts.entry(mount.mount_point.clone()).or_insert_with(|| MountGuard {
                smoothed_bytes_s: mount.growth_bytes_s,
                growth_started: None,
            });
            guard.smoothed_bytes_s = ALPHA * mount.growth_bytes_s + (1.0 - ALPHA) * guard.smoothed_bytes_s;

            if guard.smoothed_bytes_s > GROWTH_FLOOR_BYTES_S {
                if guard.growth_started.is_none() {
                    guard.growth_started = Some(now);
                }
            } else {
                guard.growth_started = None;
            }

            mount.growth_bytes_s = guard.smoothed_bytes_s;
            mount.eta_secs = if guard.smoothed_bytes_s > 0.0 {
                Some(mount.free_bytes as f64 / guard.smoothed_bytes_s)
            } else {
                None
            };
            mount.state = mount_state(mount.free_pct, mount.eta_secs, mount.inode_pct);
        }
    }
}

fn mount_state(free_pct: f64, eta_secs: Option<f64>, inode_pct: f64) -> MountState {
    let eta_crit = eta_secs.is_some_and(|e| e < 1800.0);
    let eta_warn = eta_secs.is_some_and(|e| e < 7200.0);
    if free_pct < 5.0 || eta_crit || inode_pct > 95.0 {
        MountState::Crit
    } else if free_pct < 15.0 || eta_warn || inode_pct > 85.0 {
        MountState::Warn
    } else {
        MountState::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(point: &str, growth: f64, free_pct: f64, free_bytes: u64, inode_pct: f64) -> MountRate {
        MountRate {
            mount_point: point.to_string(),
            used_pct: 100.0 - free_pct,
            free_pct,
            free_bytes,
            inode_pct,
            growth_bytes_s: growth,
            eta_secs: None,
            state: MountState::Ok,
        }
    }

    #[test]
    fn smooths_growth_toward_raw_over_successive_ticks() {
        let mut guard = DiskGuard::new();
        let mut mounts = vec![mount("/", 10_000.0, 50.0, 1_000_000_000, 10.0)];
        guard.apply(&mut mounts, 0);
        let first = mounts[0].growth_bytes_s;
        assert!((first - 10_000.0 * ALPHA).abs() < 1e-6);

        mounts[0].growth_bytes_s = 10_000.0;
        guard.apply(&mut mounts, 1);
        assert!(mounts[0].growth_bytes_s > first);
    }

    #[test]
    fn low_free_pct_forces_crit_regardless_of_eta() {
        let mut guard = DiskGuard::new();
        let mut mounts = vec![mount("/", 0.0, 3.0, 1_000_000_000, 10.0)];
        guard.apply(&mut mounts, 0);
        assert_eq!(mounts[0].state, MountState::Crit);
    }

    #[test]
    fn short_eta_forces_crit() {
        let mut guard = DiskGuard::new();
        // Smoothed after one tick at alpha=0.3 from a cold start is 0.3 * raw.
        let mut mounts = vec![mount("/", 10_000_000.0, 50.0, 1_000_000_000, 10.0)];
        guard.apply(&mut mounts, 0);
        let eta = mounts[0].eta_secs.unwrap();
        assert!(eta < 1800.0, "eta was {eta}");
        assert_eq!(mounts[0].state, MountState::Crit);
    }

    #[test]
    fn healthy_mount_stays_ok() {
        let mut guard = DiskGuard::new();
        let mut mounts = vec![mount("/", 100.0, 80.0, 100_000_000_000, 5.0)];
        guard.apply(&mut mounts, 0);
        assert_eq!(mounts[0].state, MountState::Ok);
    }

    #[test]
    fn growth_started_clears_when_smoothed_drops_below_floor() {
        let mut guard = DiskGuard::new();
        let mut mounts = vec![mount("/", 100_000.0, 50.0, 1_000_000_000, 10.0)];
        guard.apply(&mut mounts, 0);
        assert!(guard.mounts.get("/").unwrap().growth_started.is_some());

        mounts[0].growth_bytes_s = 0.0;
        for t in 1..20 {
            guard.apply(&mut mounts, t);
        }
        assert!(guard.mounts.get("/").unwrap().growth_started.is_none());
    }

    #[test]
    fn stale_mount_state_is_dropped_when_mount_disappears() {
        let mut guard = DiskGuard::new();
        let mut mounts = vec![mount("/data", 100_000.0, 50.0, 1_000_000_000, 10.0)];
        guard.apply(&mut mounts, 0);
        assert!(guard.mounts.contains_key("/data"));
        let mut empty: Vec<MountRate> = vec![];
        guard.apply(&mut empty, 1);
        assert!(!guard.mounts.contains_key("/data"));
    }
}

//! IO domain scorer.

use crate::evidence::{emit, Domain, Evidence, Owner, OwnerKind};
use crate::history::History;
use crate::model::Snapshot;
use crate::rates::{MountState, RateSnapshot};

use super::Scorer;

pub struct IoScorer;

fn top_cgroup_owner(rates: &RateSnapshot) -> Vec<Owner> {
    rates
        .cgroups
        .iter()
        .max_by(|a, b| a.io_mb_s.partial_cmp(&b.io_mb_s).unwrap())
        .filter(|c| c.io_mb_s > 0.0)
        .map(|c| {
            let id = if c.service.is_empty() { c.path.clone() } else { c.service.clone() };
            let total: f64 = rates.cgroups.iter().map(|c| c.io_mb_s).sum::<f64>().max(1e-9);
            vec![Owner::new(OwnerKind::Cgroup, id, (c.io_mb_s / total).clamp(0.0, 1.0), 0.75)]
        })
        .unwrap_or_default()
}

fn top_process_owner(rates: &RateSnapshot) -> Vec<Owner> {
    rates
        .processes
        .iter()
        .max_by(|a, b| (a.read_mb_s + a.write_mb_s).partial_cmp(&(b.read_mb_s + b.write_mb_s)).unwrap())
        .filter(|p| p.read_mb_s + p.write_mb_s > 0.0)
        .map(|p| {
            let total: f64 = rates.processes.iter().map(|p| p.read_mb_s + p.write_mb_s).sum::<f64>().max(1e-9);
            vec![Owner::new(OwnerKind::Pid, p.pid.to_string(), ((p.read_mb_s + p.write_mb_s) / total).clamp(0.0, 1.0), 0.75)]
        })
        .unwrap_or_default()
}

impl Scorer for IoScorer {
    fn bottleneck_name(&self) -> &'static str {
        "IO Starvation"
    }

    fn emit_evidence(&self, snap: &Snapshot, rates: &RateSnapshot, _history: &History) -> Vec<Evidence> {
        let mut evs = Vec::new();
        let process_owners = top_process_owner(rates);
        let cgroup_owners = top_cgroup_owner(rates);

        let psi_full = snap.psi.io.full.as_ref().map(|l| l.avg10).unwrap_or(0.0);
        evs.push(emit(
            "io.psi",
            Domain::Io,
            psi_full,
            2.0,
            15.0,
            true,
            0.9,
            format!("IO pressure stall {:.1}% over 10s", psi_full),
            "10s",
            process_owners.clone(),
        ));

        evs.push(emit(
            "io.dstate",
            Domain::Io,
            rates.dstate_count as f64,
            3.0,
            10.0,
            true,
            0.8,
            format!("{} processes stuck in D state", rates.dstate_count),
            "10s",
            process_owners.clone(),
        ));

        let await_ms = rates.worst_disk_await_ms();
        evs.push(emit(
            "io.disk.latency",
            Domain::Io,
            await_ms,
            20.0,
            200.0,
            true,
            0.85,
            format!("Worst disk await {:.1} ms", await_ms),
            "10s",
            cgroup_owners.clone(),
        ));

        let util_pct = rates.worst_disk_util_pct();
        evs.push(emit(
            "io.disk.util",
            Domain::Io,
            util_pct,
            80.0,
            98.0,
            true,
            0.85,
            format!("Worst disk utilization {:.1}%", util_pct),
            "10s",
            cgroup_owners.clone(),
        ));

        let writeback_kb = snap.mem.dirty + snap.mem.writeback;
        let writeback_pct = if snap.mem.total > 0 { writeback_kb as f64 / snap.mem.total as f64 * 100.0 } else { 0.0 };
        evs.push(emit(
            "io.writeback",
            Domain::Io,
            writeback_pct,
            5.0,
            15.0,
            true,
            0.6,
            format!("Dirty+writeback pages {:.1}% of memory", writeback_pct),
            "10s",
            vec![],
        ));

        let worst_mount = rates.worst_mount();
        let fsfull_strength_value = worst_mount
            .map(|m| {
                let by_pct = m.used_pct;
                let eta_crit = m.eta_secs.is_some_and(|e| e < 1800.0) || m.state == MountState::Crit;
                if eta_crit { 100.0 } else { by_pct }
            })
            .unwrap_or(0.0);
        evs.push(emit(
            "io.fsfull",
            Domain::Io,
            fsfull_strength_value,
            85.0,
            95.0,
            true,
            0.7,
            worst_mount
                .map(|m| format!("Mount {} at {:.1}% used", m.mount_point, m.used_pct))
                .unwrap_or_else(|| "No mount data".to_string()),
            "10s",
            vec![],
        ));

        evs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PsiInfo, PsiLine, PsiResource};
    use crate::rates::DiskRate;

    fn sample_rates() -> RateSnapshot {
        RateSnapshot {
            dt: 1.0, user_pct: 0.0, nice_pct: 0.0, system_pct: 0.0, idle_pct: 100.0, iowait_pct: 0.0,
            irq_pct: 0.0, softirq_pct: 0.0, steal_pct: 0.0, cpu_pct: 0.0, ctxswitch_rate: 0.0,
            forks_rate: 0.0, swap_in_mb_s: 0.0, swap_out_mb_s: 0.0, pgfault_rate: 0.0, pgmajfault_rate: 0.0,
            reclaim_direct_rate: 0.0, reclaim_kswapd_rate: 0.0, oom_kill_delta: 0, dstate_count: 0,
            disks: vec![], mounts: vec![], interfaces: vec![], tcp_retrans_rate: 0.0, net_errors_rate: 0.0,
            net_drops_pps: 0.0, net_softirq_rate: 0.0, cgroups: vec![], processes: vec![],
        }
    }

    #[test]
    fn io_saturation_cascade_gates_in_and_scores_high() {
        let snap = Snapshot {
            psi: PsiInfo { io: PsiResource { some: PsiLine::default(), full: Some(PsiLine { avg10: 12.0, ..Default::default() }) }, ..Default::default() },
            ..Default::default()
        };
        let mut rates = sample_rates();
        rates.dstate_count = 4;
        rates.disks.push(DiskRate {
            device: "sda".into(), read_mb_s: 0.0, write_mb_s: 0.0, iops: 0.0,
            await_ms: 45.0, util_pct: 97.0, queue_depth: 0.0,
        });
        let history = History::new(4, 1.0);
        let entry = IoScorer.score(&snap, &rates, &history);
        assert!(entry.score >= 60.0, "score was {}", entry.score);
        for id in ["io.psi", "io.disk.latency", "io.disk.util", "io.dstate"] {
            assert!(entry.evidence.iter().any(|e| e.id == id && e.strength > 0.0), "missing {id}");
        }
    }
}

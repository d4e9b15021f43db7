//! CPU domain scorer.

use crate::evidence::{emit, Domain, Evidence, Owner, OwnerKind};
use crate::history::History;
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

use super::Scorer;

pub struct CpuScorer;

fn top_cgroup_owner(rates: &RateSnapshot) -> Vec<Owner> {
    rates
        .cgroups
        .iter()
        .max_by(|a, b| a.cpu_pct.partial_cmp(&b.cpu_pct).unwrap())
        .filter(|c| c.cpu_pct > 0.0)
        .map(|c| {
            let id = if c.service.is_empty() { c.path.clone() } else { c.service.clone() };
            vec![Owner::new(OwnerKind::Cgroup, id, (c.cpu_pct / 100.0).clamp(0.0, 1.0), 0.8)]
        })
        .unwrap_or_default()
}

fn top_process_owner(rates: &RateSnapshot) -> Vec<Owner> {
    rates
        .processes
        .iter()
        .max_by(|a, b| a.cpu_pct.partial_cmp(&b.cpu_pct).unwrap())
        .filter(|p| p.cpu_pct > 0.0)
        .map(|p| vec![Owner::new(OwnerKind::Pid, p.pid.to_string(), (p.cpu_pct / 100.0).clamp(0.0, 1.0), 0.8)])
        .unwrap_or_default()
}

impl Scorer for CpuScorer {
    fn bottleneck_name(&self) -> &'static str {
        "CPU Contention"
    }

    fn emit_evidence(&self, snap: &Snapshot, rates: &RateSnapshot, _history: &History) -> Vec<Evidence> {
        let mut evs = Vec::new();
        let cgroup_owners = top_cgroup_owner(rates);
        let process_owners = top_process_owner(rates);

        let psi = snap.psi.cpu.some.avg10;
        evs.push(emit(
            "cpu.psi",
            Domain::Cpu,
            psi,
            2.0,
            15.0,
            true,
            0.9,
            format!("CPU pressure stall {:.1}% over 10s", psi),
            "10s",
            process_owners.clone(),
        ));

        let ncpus = snap.cpus.iter().filter(|c| c.core_id >= 0).count().max(1) as f64;
        let runqueue = snap.load.load1 / ncpus;
        evs.push(emit(
            "cpu.runqueue",
            Domain::Cpu,
            runqueue,
            1.0,
            3.0,
            true,
            0.85,
            format!("Run queue {:.2} load/core", runqueue),
            "1m",
            process_owners.clone(),
        ));

        let ctxswitch_per_core = rates.ctxswitch_rate / ncpus;
        evs.push(emit(
            "cpu.ctxswitch",
            Domain::Cpu,
            ctxswitch_per_core,
            30_000.0,
            100_000.0,
            true,
            0.6,
            format!("{:.0} context switches/s per core", ctxswitch_per_core),
            "10s",
            vec![],
        ));

        evs.push(emit(
            "cpu.steal",
            Domain::Cpu,
            rates.steal_pct,
            1.0,
            10.0,
            true,
            0.85,
            format!("Hypervisor CPU steal {:.1}%", rates.steal_pct),
            "10s",
            vec![],
        ));

        let worst_throttle = rates.cgroups.iter().map(|c| c.throttle_pct).fold(0.0_f64, f64::max);
        evs.push(emit(
            "cpu.cgroup.throttle",
            Domain::Cpu,
            worst_throttle,
            5.0,
            30.0,
            true,
            0.85,
            format!("Cgroup CFS throttling {:.1}%", worst_throttle),
            "10s",
            cgroup_owners.clone(),
        ));

        evs.push(emit(
            "cpu.softirq",
            Domain::Cpu,
            rates.softirq_pct,
            5.0,
            20.0,
            true,
            0.7,
            format!("Softirq CPU time {:.1}%", rates.softirq_pct),
            "10s",
            vec![],
        ));

        if snap.sentinel.attach_err.is_none() {
            if let Some(worst) = snap.sentinel.cgroup_throttle_rate.values().cloned().fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }) {
                evs.push(emit(
                    "cpu.sentinel.throttle",
                    Domain::Cpu,
                    worst,
                    5.0,
                    30.0,
                    true,
                    0.9,
                    format!("eBPF-observed throttle rate {:.1}/s", worst),
                    "10s",
                    cgroup_owners,
                ));
            }
        }

        evs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CpuTimes, LoadInfo, PsiInfo, PsiLine, PsiResource};

    fn snap_with_cpu_throttle() -> Snapshot {
        Snapshot {
            psi: PsiInfo { cpu: PsiResource { some: PsiLine { avg10: 25.0, ..Default::default() }, full: None }, ..Default::default() },
            load: LoadInfo { load1: 6.0, ..Default::default() },
            cpus: vec![CpuTimes { core_id: -1, ..Default::default() }, CpuTimes { core_id: 0, ..Default::default() }, CpuTimes { core_id: 1, ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn cpu_throttle_cascade_gates_in() {
        let snap = snap_with_cpu_throttle();
        let mut rates = RateSnapshot {
            dt: 1.0, user_pct: 0.0, nice_pct: 0.0, system_pct: 0.0, idle_pct: 0.0, iowait_pct: 0.0,
            irq_pct: 0.0, softirq_pct: 0.0, steal_pct: 0.0, cpu_pct: 100.0, ctxswitch_rate: 0.0,
            forks_rate: 0.0, swap_in_mb_s: 0.0, swap_out_mb_s: 0.0, pgfault_rate: 0.0, pgmajfault_rate: 0.0,
            reclaim_direct_rate: 0.0, reclaim_kswapd_rate: 0.0, oom_kill_delta: 0, dstate_count: 0,
            disks: vec![], mounts: vec![], interfaces: vec![], tcp_retrans_rate: 0.0, net_errors_rate: 0.0,
            net_drops_pps: 0.0, net_softirq_rate: 0.0, cgroups: vec![], processes: vec![],
        };
        rates.cgroups.push(crate::rates::CgroupRate {
            path: "/kubepods/foo".into(), cpu_pct: 50.0, throttle_pct: 40.0, mem_pct: None, io_mb_s: 0.0,
            service: "k8s:abc".into(),
        });
        let history = History::new(4, 1.0);
        let entry = CpuScorer.score(&snap, &rates, &history);
        assert!(entry.score > 0.0);
        assert!(entry.evidence.iter().any(|e| e.id == "cpu.cgroup.throttle" && e.strength > 0.0));
    }
}

//! Memory domain scorer.

use crate::evidence::{emit, Domain, Evidence, Owner, OwnerKind};
use crate::history::History;
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

use super::Scorer;

pub struct MemoryScorer;

/// `mem.major.faults` has no fixed threshold; resolved in DESIGN.md:
/// warn/crit scale off the 30-sample trailing average, floored so a
/// cold/empty history still gates sanely.
fn major_fault_thresholds(history: &History) -> (f64, f64) {
    let samples: Vec<f64> = (0..history.len().min(30))
        .rev()
        .filter_map(|back| {
            let idx = history.len().checked_sub(1 + back)?;
            history.get_rate(idx).map(|r| r.pgmajfault_rate)
        })
        .collect();
    if samples.is_empty() {
        return (50.0, 500.0);
    }
    let baseline = samples.iter().sum::<f64>() / samples.len() as f64;
    ((baseline * 3.0).max(50.0), (baseline * 10.0).max(500.0))
}

fn top_cgroup_owner(rates: &RateSnapshot) -> Vec<Owner> {
    rates
        .cgroups
        .iter()
        .filter_map(|c| c.mem_pct.map(|m| (c, m)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
        .filter(|(_, m)| *m > 0.0)
        .map(|(c, m)| {
            let id = if c.service.is_empty() { c.path.clone() } else { c.service.clone() };
            vec![Owner::new(OwnerKind::Cgroup, id, (m / 100.0).clamp(0.0, 1.0), 0.8)]
        })
        .unwrap_or_default()
}

fn top_process_owner(rates: &RateSnapshot) -> Vec<Owner> {
    rates
        .processes
        .iter()
        .max_by(|a, b| a.mem_pct.partial_cmp(&b.mem_pct).unwrap())
        .filter(|p| p.mem_pct > 0.0)
        .map(|p| vec![Owner::new(OwnerKind::Pid, p.pid.to_string(), (p.mem_pct / 100.0).clamp(0.0, 1.0), 0.8)])
        .unwrap_or_default()
}

impl Scorer for MemoryScorer {
    fn bottleneck_name(&self) -> &'static str {
        "Memory Pressure"
    }

    fn emit_evidence(&self, snap: &Snapshot, rates: &RateSnapshot, history: &History) -> Vec<Evidence> {
        let mut evs = Vec::new();
        let process_owners = top_process_owner(rates);
        let cgroup_owners = top_cgroup_owner(rates);

        let psi_full = snap.psi.memory.full.as_ref().map(|l| l.avg10).unwrap_or(0.0);
        evs.push(emit(
            "mem.psi",
            Domain::Memory,
            psi_full,
            2.0,
            15.0,
            true,
            0.9,
            format!("Memory pressure stall {:.1}% over 10s", psi_full),
            "10s",
            process_owners.clone(),
        ));

        let avail_pct = if snap.mem.total > 0 { snap.mem.available as f64 / snap.mem.total as f64 * 100.0 } else { 100.0 };
        let unavail_pct = 100.0 - avail_pct;
        evs.push(emit(
            "mem.available.low",
            Domain::Memory,
            unavail_pct,
            70.0,
            90.0,
            true,
            0.85,
            format!("Only {:.1}% memory available", avail_pct),
            "10s",
            process_owners.clone(),
        ));

        evs.push(emit(
            "mem.reclaim.direct",
            Domain::Memory,
            rates.reclaim_direct_rate,
            100.0,
            1000.0,
            true,
            0.8,
            format!("Direct reclaim {:.0} pages/s", rates.reclaim_direct_rate),
            "10s",
            vec![],
        ));

        let swap_mb_s = rates.swap_in_mb_s + rates.swap_out_mb_s;
        evs.push(emit(
            "mem.swap.activity",
            Domain::Memory,
            swap_mb_s,
            1.0,
            10.0,
            true,
            0.85,
            format!("Swap activity {:.1} MB/s", swap_mb_s),
            "10s",
            process_owners.clone(),
        ));

        let (warn, crit) = major_fault_thresholds(history);
        evs.push(emit(
            "mem.major.faults",
            Domain::Memory,
            rates.pgmajfault_rate,
            warn,
            crit,
            true,
            0.6,
            format!("Major page faults {:.0}/s", rates.pgmajfault_rate),
            "10s",
            vec![],
        ));

        evs.push(emit(
            "mem.oom.kills",
            Domain::Memory,
            rates.oom_kill_delta as f64,
            1.0,
            1.0,
            true,
            0.95,
            "OOM crisis — kernel killing processes to free memory",
            "1t",
            cgroup_owners,
        ));

        evs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemInfo, PsiInfo, PsiLine, PsiResource};

    #[test]
    fn oom_kill_evidence_reaches_full_strength_instantly() {
        let snap = Snapshot { mem: MemInfo { total: 1000, available: 500, ..Default::default() }, ..Default::default() };
        let mut rates = sample_rates();
        rates.oom_kill_delta = 2;
        let history = History::new(4, 1.0);
        let entry = MemoryScorer.score(&snap, &rates, &history);
        let oom = entry.evidence.iter().find(|e| e.id == "mem.oom.kills").unwrap();
        assert_eq!(oom.strength, 1.0);
    }

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
    fn available_low_evidence_scales_with_unavailable_pct() {
        let snap = Snapshot {
            mem: MemInfo { total: 1000, available: 50, ..Default::default() },
            psi: PsiInfo { memory: PsiResource { some: PsiLine::default(), full: Some(PsiLine { avg10: 0.0, ..Default::default() }) }, ..Default::default() },
            ..Default::default()
        };
        let rates = sample_rates();
        let history = History::new(4, 1.0);
        let entry = MemoryScorer.score(&snap, &rates, &history);
        let ev = entry.evidence.iter().find(|e| e.id == "mem.available.low").unwrap();
        assert!(ev.strength > 0.0);
    }
}

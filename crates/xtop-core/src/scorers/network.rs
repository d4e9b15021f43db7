//! Network domain scorer. Culprit attribution here
//! favors CLOSE_WAIT leakers and the top retransmitting process over the
//! cgroup/process owner lists the other three domains reuse.

use crate::evidence::{emit, Domain, Evidence, Owner, OwnerKind};
use crate::history::History;
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

use super::Scorer;

pub struct NetworkScorer;

fn closewait_owners(snap: &Snapshot) -> Vec<Owner> {
    let total: u32 = snap.close_wait_leakers.iter().map(|l| l.count).sum::<u32>().max(1);
    snap.close_wait_leakers
        .iter()
        .max_by_key(|l| l.count)
        .map(|l| vec![Owner::new(OwnerKind::Pid, l.pid.to_string(), l.count as f64 / total as f64, 0.75)])
        .unwrap_or_default()
}

fn top_retrans_owner(rates: &RateSnapshot) -> Vec<Owner> {
    // Retransmit counters are system-wide in this snapshot model; attribute
    // to the busiest network-writing process as a best-effort culprit.
    rates
        .processes
        .iter()
        .max_by(|a, b| a.write_mb_s.partial_cmp(&b.write_mb_s).unwrap())
        .filter(|p| p.write_mb_s > 0.0)
        .map(|p| vec![Owner::new(OwnerKind::Pid, p.pid.to_string(), 0.5, 0.5)])
        .unwrap_or_default()
}

impl Scorer for NetworkScorer {
    fn bottleneck_name(&self) -> &'static str {
        "Network Degradation"
    }

    fn emit_evidence(&self, snap: &Snapshot, rates: &RateSnapshot, _history: &History) -> Vec<Evidence> {
        let mut evs = Vec::new();
        let closewait_owners = closewait_owners(snap);
        let retrans_owners = top_retrans_owner(rates);

        evs.push(emit(
            "net.drops",
            Domain::Network,
            rates.net_drops_pps,
            1.0,
            75.0,
            true,
            0.8,
            format!("Packet drops {:.1}/s", rates.net_drops_pps),
            "10s",
            vec![],
        ));

        evs.push(emit(
            "net.tcp.retrans",
            Domain::Network,
            rates.tcp_retrans_rate,
            0.5,
            4.0,
            true,
            0.85,
            format!("TCP retransmits {:.2}/s", rates.tcp_retrans_rate),
            "10s",
            retrans_owners,
        ));

        let conntrack_pct = if snap.conntrack.max > 0 { snap.conntrack.count as f64 / snap.conntrack.max as f64 * 100.0 } else { 0.0 };
        evs.push(emit(
            "net.conntrack",
            Domain::Network,
            conntrack_pct,
            70.0,
            90.0,
            true,
            0.8,
            format!("Conntrack table {:.1}% full", conntrack_pct),
            "10s",
            vec![],
        ));

        evs.push(emit(
            "net.softirq",
            Domain::Network,
            rates.net_softirq_rate,
            10_000.0,
            50_000.0,
            true,
            0.6,
            format!("Net softirq rate {:.0}/s", rates.net_softirq_rate),
            "10s",
            vec![],
        ));

        let total_conns = snap.tcp_states.total().max(1);
        let time_wait_pct = snap.tcp_states.time_wait as f64 / total_conns as f64 * 100.0;
        evs.push(emit(
            "net.tcp.state",
            Domain::Network,
            time_wait_pct,
            50.0,
            80.0,
            true,
            0.55,
            format!("TIME_WAIT {:.1}% of connections", time_wait_pct),
            "10s",
            vec![],
        ));

        evs.push(emit(
            "net.closewait",
            Domain::Network,
            snap.tcp_states.close_wait as f64,
            100.0,
            1000.0,
            true,
            0.75,
            format!("{} sockets stuck in CLOSE_WAIT", snap.tcp_states.close_wait),
            "10s",
            closewait_owners,
        ));

        evs.push(emit(
            "net.errors",
            Domain::Network,
            rates.net_errors_rate,
            1.0,
            10.0,
            true,
            0.6,
            format!("Network errors {:.2}/s", rates.net_errors_rate),
            "10s",
            vec![],
        ));

        if snap.sentinel.attach_err.is_none() {
            evs.push(emit(
                "net.sentinel.drops",
                Domain::Network,
                snap.sentinel.pkt_drop_rate,
                1.0,
                75.0,
                true,
                0.9,
                format!("eBPF-observed drop rate {:.1}/s", snap.sentinel.pkt_drop_rate),
                "10s",
                vec![],
            ));
            evs.push(emit(
                "net.sentinel.resets",
                Domain::Network,
                snap.sentinel.tcp_resets_rate,
                0.5,
                4.0,
                true,
                0.9,
                format!("eBPF-observed reset rate {:.1}/s", snap.sentinel.tcp_resets_rate),
                "10s",
                vec![],
            ));
        }

        evs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CloseWaitLeaker;

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
    fn closewait_leak_attributes_top_leaker() {
        let snap = Snapshot {
            close_wait_leakers: vec![
                CloseWaitLeaker { pid: 10, comm: "svc-a".into(), count: 20 },
                CloseWaitLeaker { pid: 11, comm: "svc-b".into(), count: 900 },
            ],
            ..Default::default()
        };
        let owners = closewait_owners(&snap);
        assert_eq!(owners[0].id, "11");
    }

    #[test]
    fn noisy_neighbor_steal_mentions_hypervisor_via_cpu_not_network() {
        let snap = Snapshot::default();
        let rates = sample_rates();
        let history = History::new(4, 1.0);
        let entry = NetworkScorer.score(&snap, &rates, &history);
        assert_eq!(entry.score, 0.0);
    }
}

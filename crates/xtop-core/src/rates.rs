//! Rate calculation — turns a (prev, curr) [`Snapshot`] pair into a
//! [`RateSnapshot`] (C2).
//!
//! This is the single source of truth for every derived-per-second value
//! downstream components read. Counter regressions (wrap or daemon restart)
//! never produce a negative rate: they clamp to zero.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{CgroupInfo, DiskInfo, MountInfo, NetIfInfo, ProcessInfo, Snapshot};

/// Minimum dt used for any rate computation, guards against div-by-zero when
/// two ticks land on the same wall-clock second.
pub const MIN_DT_SECS: f64 = 1.0;

/// Returns `max(0, curr - prev)`. Never negative — the defining property of
/// every rate in this module.
pub fn delta_u64(curr: u64, prev: u64) -> u64 {
    curr.saturating_sub(prev)
}

fn rate_u64(curr: u64, prev: u64, dt: f64) -> f64 {
    delta_u64(curr, prev) as f64 / dt
}

/// A filesystem path a process holds open, resolved well enough to judge
/// whether it's a plain regular file worth reporting as a "top writer"
/// target. Supplied by the collector boundary — never fabricated here.
#[derive(Clone, Debug, PartialEq)]
pub struct FdTarget {
    pub path: String,
    pub size_bytes: u64,
}

/// Best-effort `/proc/<pid>/fd` resolver. Implementations must never fail:
/// on any access error, return an empty `Vec`.
pub trait ProcFsProbe: Send + Sync {
    fn fd_targets(&self, pid: u32) -> Vec<FdTarget>;
}

/// A `ProcFsProbe` that never resolves anything — the default when no
/// filesystem access is wired in (e.g. replay, or platforms without `/proc`).
pub struct NoProcFsProbe;

impl ProcFsProbe for NoProcFsProbe {
    fn fd_targets(&self, _pid: u32) -> Vec<FdTarget> {
        Vec::new()
    }
}

/// Drops fd targets that can never be a meaningful "largest open file":
/// pipes, sockets, anonymous inodes, and virtual filesystems.
fn is_real_file_target(path: &str) -> bool {
    if path.ends_with(" (deleted)") {
        return false;
    }
    !(path.starts_with("pipe:")
        || path.starts_with("socket:")
        || path.starts_with("anon_inode:")
        || path.starts_with("/proc")
        || path.starts_with("/sys")
        || path.starts_with("/dev"))
}

/// Picks the largest plausible regular-file target among a process's open
/// fds, or `""` if none qualify / the probe found nothing.
pub fn resolve_top_writer_path(probe: &dyn ProcFsProbe, pid: u32) -> String {
    probe
        .fd_targets(pid)
        .into_iter()
        .filter(|t| is_real_file_target(&t.path))
        .max_by_key(|t| t.size_bytes)
        .map(|t| t.path)
        .unwrap_or_default()
}

/// Shallow cgroup-path -> service-name heuristic.
pub fn resolve_service_name(cgroup_path: &str) -> String {
    if let Some(idx) = cgroup_path.find("kubepods") {
        if let Some(id) = cgroup_path[idx..].rsplit('/').next() {
            let id = id.trim_end_matches(".scope");
            if id.len() >= 12 && id.chars().all(|c| c.is_ascii_hexdigit()) {
                return format!("k8s:{}", &id[..12]);
            }
        }
    }
    if cgroup_path.contains("docker") {
        if let Some(leaf) = cgroup_path.rsplit('/').next() {
            let id = leaf
                .strip_prefix("docker-")
                .and_then(|s| s.strip_suffix(".scope"))
                .unwrap_or(leaf);
            if id.len() >= 12 && id.chars().all(|c| c.is_ascii_hexdigit()) {
                return format!("docker:{}", &id[..12]);
            }
        }
    }
    if let Some(leaf) = cgroup_path.rsplit('/').next() {
        if leaf.ends_with(".service") || leaf.ends_with(".scope") {
            return leaf.to_string();
        }
    }
    String::new()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    #[default]
    Ok,
    Warn,
    Crit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiskRate {
    pub device: String,
    pub read_mb_s: f64,
    pub write_mb_s: f64,
    pub iops: f64,
    pub await_ms: f64,
    pub util_pct: f64,
    pub queue_depth: f64,
}

/// Mount growth/DiskGuard: raw growth is filled in here by [`crate::rates`]; the
/// orchestrator overwrites `growth_bytes_s`/`eta_secs`/`state` with the
/// EWMA-smoothed values before history ever sees them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MountRate {
    pub mount_point: String,
    pub used_pct: f64,
    pub free_pct: f64,
    pub free_bytes: u64,
    pub inode_pct: f64,
    pub growth_bytes_s: f64,
    pub eta_secs: Option<f64>,
    pub state: MountState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetIfRate {
    pub name: String,
    pub rx_mb_s: f64,
    pub tx_mb_s: f64,
    pub rx_pps: f64,
    pub tx_pps: f64,
    pub rx_drops_s: f64,
    pub tx_drops_s: f64,
    pub rx_errors_s: f64,
    pub tx_errors_s: f64,
    /// -1.0 when the interface reports no link speed.
    pub util_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CgroupRate {
    pub path: String,
    pub cpu_pct: f64,
    pub throttle_pct: f64,
    pub mem_pct: Option<f64>,
    pub io_mb_s: f64,
    pub service: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessRate {
    pub pid: u32,
    pub comm: String,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub read_mb_s: f64,
    pub write_mb_s: f64,
    pub minflt_rate: f64,
    pub majflt_rate: f64,
    pub ctxswitch_rate: f64,
    pub fd_pct: f64,
    pub write_path: String,
    pub service: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub dt: f64,
    pub user_pct: f64,
    pub nice_pct: f64,
    pub system_pct: f64,
    pub idle_pct: f64,
    pub iowait_pct: f64,
    pub irq_pct: f64,
    pub softirq_pct: f64,
    pub steal_pct: f64,
    /// `100 - idle_pct`, the headline "CPU busy" number.
    pub cpu_pct: f64,
    pub ctxswitch_rate: f64,
    pub forks_rate: f64,
    pub swap_in_mb_s: f64,
    pub swap_out_mb_s: f64,
    pub pgfault_rate: f64,
    pub pgmajfault_rate: f64,
    pub reclaim_direct_rate: f64,
    pub reclaim_kswapd_rate: f64,
    pub oom_kill_delta: u64,
    pub dstate_count: u32,
    pub disks: Vec<DiskRate>,
    pub mounts: Vec<MountRate>,
    pub interfaces: Vec<NetIfRate>,
    pub tcp_retrans_rate: f64,
    pub net_errors_rate: f64,
    pub net_drops_pps: f64,
    pub net_softirq_rate: f64,
    pub cgroups: Vec<CgroupRate>,
    pub processes: Vec<ProcessRate>,
}

impl RateSnapshot {
    pub fn worst_disk_await_ms(&self) -> f64 {
        self.disks.iter().map(|d| d.await_ms).fold(0.0, f64::max)
    }

    pub fn worst_disk_util_pct(&self) -> f64 {
        self.disks.iter().map(|d| d.util_pct).fold(0.0, f64::max)
    }

    pub fn worst_mount(&self) -> Option<&MountRate> {
        self.mounts.iter().max_by(|a, b| {
            mount_severity_rank(a.state)
                .cmp(&mount_severity_rank(b.state))
                .then(a.used_pct.partial_cmp(&b.used_pct).unwrap_or(std::cmp::Ordering::Equal))
        })
    }

    pub fn top_writer(&self) -> Option<&ProcessRate> {
        self.processes
            .iter()
            .max_by(|a, b| a.write_mb_s.partial_cmp(&b.write_mb_s).unwrap())
    }
}

fn mount_severity_rank(s: MountState) -> u8 {
    match s {
        MountState::Ok => 0,
        MountState::Warn => 1,
        MountState::Crit => 2,
    }
}

fn compute_disk_rate(curr: &DiskInfo, prev: Option<&DiskInfo>, dt: f64) -> DiskRate {
    let Some(prev) = prev else {
        return DiskRate {
            device: curr.device.clone(),
            read_mb_s: 0.0,
            write_mb_s: 0.0,
            iops: 0.0,
            await_ms: 0.0,
            util_pct: 0.0,
            queue_depth: 0.0,
        };
    };
    const SECTOR_BYTES: f64 = 512.0;
    let reads_d = delta_u64(curr.reads_completed, prev.reads_completed);
    let writes_d = delta_u64(curr.writes_completed, prev.writes_completed);
    let ops_d = reads_d + writes_d;
    let read_mb_s = delta_u64(curr.sectors_read, prev.sectors_read) as f64 * SECTOR_BYTES
        / dt
        / (1024.0 * 1024.0);
    let write_mb_s = delta_u64(curr.sectors_written, prev.sectors_written) as f64 * SECTOR_BYTES
        / dt
        / (1024.0 * 1024.0);
    let time_d = delta_u64(curr.read_time_ms, prev.read_time_ms)
        + delta_u64(curr.write_time_ms, prev.write_time_ms);
    let await_ms = if ops_d > 0 { time_d as f64 / ops_d as f64 } else { 0.0 };
    let io_time_d = delta_u64(curr.io_time_ms, prev.io_time_ms);
    let util_pct = (io_time_d as f64 / (dt * 1000.0) * 100.0).min(100.0);
    let weighted_d = delta_u64(curr.weighted_io_time_ms, prev.weighted_io_time_ms);
    let queue_depth = weighted_d as f64 / (dt * 1000.0);
    DiskRate {
        device: curr.device.clone(),
        read_mb_s,
        write_mb_s,
        iops: ops_d as f64 / dt,
        await_ms,
        util_pct,
        queue_depth,
    }
}

fn compute_mount_rate(curr: &MountInfo, prev: Option<&MountInfo>, dt: f64) -> MountRate {
    let used_bytes = curr.bytes_total.saturating_sub(curr.bytes_avail);
    let used_pct = if curr.bytes_total > 0 {
        used_bytes as f64 / curr.bytes_total as f64 * 100.0
    } else {
        0.0
    };
    let free_pct = 100.0 - used_pct;
    let inode_pct = if curr.inodes_total > 0 {
        (1.0 - curr.inodes_free as f64 / curr.inodes_total as f64) * 100.0
    } else {
        0.0
    };
    let growth_bytes_s = prev
        .map(|p| {
            let prev_used = p.bytes_total.saturating_sub(p.bytes_avail);
            (used_bytes as i64 - prev_used as i64) as f64 / dt
        })
        .unwrap_or(0.0)
        .max(0.0);
    MountRate {
        mount_point: curr.mount_point.clone(),
        used_pct,
        free_pct,
        free_bytes: curr.bytes_avail,
        inode_pct,
        growth_bytes_s,
        eta_secs: None,
        state: MountState::Ok,
    }
}

fn compute_netif_rate(curr: &NetIfInfo, prev: Option<&NetIfInfo>, dt: f64) -> NetIfRate {
    let Some(prev) = prev else {
        return NetIfRate {
            name: curr.name.clone(),
            rx_mb_s: 0.0,
            tx_mb_s: 0.0,
            rx_pps: 0.0,
            tx_pps: 0.0,
            rx_drops_s: 0.0,
            tx_drops_s: 0.0,
            rx_errors_s: 0.0,
            tx_errors_s: 0.0,
            util_pct: curr.speed_mbps.map(|_| 0.0).unwrap_or(-1.0),
        };
    };
    let rx_mb_s = rate_u64(curr.rx_bytes, prev.rx_bytes, dt) / (1024.0 * 1024.0);
    let tx_mb_s = rate_u64(curr.tx_bytes, prev.tx_bytes, dt) / (1024.0 * 1024.0);
    let util_pct = match curr.speed_mbps {
        Some(speed) if speed > 0 => {
            ((rx_mb_s + tx_mb_s) * 8.0 * 1024.0 / speed as f64) * 100.0
        }
        _ => -1.0,
    };
    NetIfRate {
        name: curr.name.clone(),
        rx_mb_s,
        tx_mb_s,
        rx_pps: rate_u64(curr.rx_packets, prev.rx_packets, dt),
        tx_pps: rate_u64(curr.tx_packets, prev.tx_packets, dt),
        rx_drops_s: rate_u64(curr.rx_drops, prev.rx_drops, dt),
        tx_drops_s: rate_u64(curr.tx_drops, prev.tx_drops, dt),
        rx_errors_s: rate_u64(curr.rx_errors, prev.rx_errors, dt),
        tx_errors_s: rate_u64(curr.tx_errors, prev.tx_errors, dt),
        util_pct,
    }
}

fn compute_cgroup_rate(curr: &CgroupInfo, prev: Option<&CgroupInfo>, dt: f64) -> CgroupRate {
    let service = resolve_service_name(&curr.path);
    let (cpu_pct, throttle_pct) = match (&curr.cpu, prev.and_then(|p| p.cpu.as_ref())) {
        (Some(c), Some(p)) => {
            let wall_usec = dt * 1_000_000.0;
            let cores = match (c.quota, c.period) {
                (Some(q), Some(per)) if q > 0 && per > 0 => q as f64 / per as f64,
                _ => 1.0,
            };
            let usage_d = delta_u64(c.usage_usec, p.usage_usec) as f64;
            let throttle_d = delta_u64(c.throttled_usec, p.throttled_usec) as f64;
            ((usage_d / wall_usec / cores) * 100.0, (throttle_d / wall_usec) * 100.0)
        }
        _ => (0.0, 0.0),
    };
    let mem_pct = curr.memory.as_ref().and_then(|m| {
        m.limit.filter(|l| *l > 0).map(|l| m.current as f64 / l as f64 * 100.0)
    });
    let io_mb_s = match (&curr.io, prev.and_then(|p| p.io.as_ref())) {
        (Some(c), Some(p)) => {
            let bytes_d = delta_u64(c.rbytes, p.rbytes) + delta_u64(c.wbytes, p.wbytes);
            bytes_d as f64 / dt / (1024.0 * 1024.0)
        }
        _ => 0.0,
    };
    CgroupRate { path: curr.path.clone(), cpu_pct, throttle_pct, mem_pct, io_mb_s, service }
}

fn compute_process_rate(
    curr: &ProcessInfo,
    prev: Option<&ProcessInfo>,
    dt: f64,
    total_ticks_delta: f64,
    ncpus: f64,
    total_mem_kb: f64,
    probe: &dyn ProcFsProbe,
) -> ProcessRate {
    let service = resolve_service_name(&curr.cgroup_path);
    let mem_pct = if total_mem_kb > 0.0 { curr.rss_kb as f64 / total_mem_kb * 100.0 } else { 0.0 };
    let Some(prev) = prev else {
        return ProcessRate {
            pid: curr.pid,
            comm: curr.comm.clone(),
            cpu_pct: 0.0,
            mem_pct,
            read_mb_s: 0.0,
            write_mb_s: 0.0,
            minflt_rate: 0.0,
            majflt_rate: 0.0,
            ctxswitch_rate: 0.0,
            fd_pct: fd_pct(curr),
            write_path: String::new(),
            service,
        };
    };
    let ticks_d = delta_u64(curr.utime + curr.stime, prev.utime + prev.stime) as f64;
    let cpu_pct = if total_ticks_delta > 0.0 {
        ticks_d / total_ticks_delta * 100.0 * ncpus
    } else {
        0.0
    };
    let read_mb_s = rate_u64(curr.read_bytes, prev.read_bytes, dt) / (1024.0 * 1024.0);
    let write_mb_s = rate_u64(curr.write_bytes, prev.write_bytes, dt) / (1024.0 * 1024.0);
    let write_path = if write_mb_s > 0.0 {
        resolve_top_writer_path(probe, curr.pid)
    } else {
        String::new()
    };
    ProcessRate {
        pid: curr.pid,
        comm: curr.comm.clone(),
        cpu_pct,
        mem_pct,
        read_mb_s,
        write_mb_s,
        minflt_rate: rate_u64(curr.minflt, prev.minflt, dt),
        majflt_rate: rate_u64(curr.majflt, prev.majflt, dt),
        ctxswitch_rate: rate_u64(
            curr.voluntary_ctxt_switches + curr.nonvoluntary_ctxt_switches,
            prev.voluntary_ctxt_switches + prev.nonvoluntary_ctxt_switches,
            dt,
        ),
        fd_pct: fd_pct(curr),
        write_path,
        service,
    }
}

fn fd_pct(p: &ProcessInfo) -> f64 {
    if p.fd_limit_soft > 0 {
        p.fd_count as f64 / p.fd_limit_soft as f64 * 100.0
    } else {
        0.0
    }
}

/// Resolves only the **top 20** writers by `write_mb_s` to a filesystem
/// path, bounding fd enumeration cost.
const TOP_WRITER_CANDIDATES: usize = 20;

/// Deterministic (prev, curr) -> [`RateSnapshot`] procedure.
pub fn compute_rates(prev: &Snapshot, curr: &Snapshot, probe: &dyn ProcFsProbe) -> RateSnapshot {
    let dt = ((curr.timestamp - prev.timestamp) as f64).max(MIN_DT_SECS);

    let (
        user_pct,
        nice_pct,
        system_pct,
        idle_pct,
        iowait_pct,
        irq_pct,
        softirq_pct,
        steal_pct,
        total_ticks_delta,
    ) = match (curr.aggregate_cpu(), prev.aggregate_cpu()) {
        (Some(c), Some(p)) => {
            let total_d = delta_u64(c.total(), p.total()) as f64;
            if total_d <= 0.0 {
                (0.0, 0.0, 0.0, 100.0, 0.0, 0.0, 0.0, 0.0, 0.0)
            } else {
                let pct = |cc: u64, pp: u64| delta_u64(cc, pp) as f64 / total_d * 100.0;
                (
                    pct(c.user, p.user),
                    pct(c.nice, p.nice),
                    pct(c.system, p.system),
                    pct(c.idle, p.idle),
                    pct(c.iowait, p.iowait),
                    pct(c.irq, p.irq),
                    pct(c.softirq, p.softirq),
                    pct(c.steal, p.steal),
                    total_d,
                )
            }
        }
        _ => (0.0, 0.0, 0.0, 100.0, 0.0, 0.0, 0.0, 0.0, 0.0),
    };

    let ncpus = curr.cpus.iter().filter(|c| c.core_id >= 0).count().max(1) as f64;

    const PAGE_BYTES: f64 = 4096.0;
    let swap_in_mb_s =
        rate_u64(curr.vmstat.pswpin, prev.vmstat.pswpin, dt) * PAGE_BYTES / (1024.0 * 1024.0);
    let swap_out_mb_s =
        rate_u64(curr.vmstat.pswpout, prev.vmstat.pswpout, dt) * PAGE_BYTES / (1024.0 * 1024.0);

    let disks = curr
        .disks
        .iter()
        .map(|d| {
            let p = prev.disks.iter().find(|p| p.device == d.device);
            compute_disk_rate(d, p, dt)
        })
        .collect();

    let mounts = curr
        .mounts
        .iter()
        .map(|m| {
            let p = prev.mounts.iter().find(|p| p.mount_point == m.mount_point);
            compute_mount_rate(m, p, dt)
        })
        .collect();

    let interfaces = curr
        .interfaces
        .iter()
        .map(|n| {
            let p = prev.interfaces.iter().find(|p| p.name == n.name);
            compute_netif_rate(n, p, dt)
        })
        .collect();

    let cgroups = curr
        .cgroups
        .iter()
        .map(|c| {
            let p = prev.cgroups.iter().find(|p| p.path == c.path);
            compute_cgroup_rate(c, p, dt)
        })
        .collect();

    let prev_by_pid: HashMap<u32, &ProcessInfo> =
        prev.processes.iter().map(|p| (p.pid, p)).collect();

    let mut ranked_by_write: Vec<&ProcessInfo> = curr.processes.iter().collect();
    ranked_by_write.sort_by(|a, b| {
        let wa = prev_by_pid.get(&a.pid).map(|p| delta_u64(a.write_bytes, p.write_bytes));
        let wb = prev_by_pid.get(&b.pid).map(|p| delta_u64(b.write_bytes, p.write_bytes));
        wb.cmp(&wa)
    });
    let top_write_pids: std::collections::HashSet<u32> = ranked_by_write
        .into_iter()
        .take(TOP_WRITER_CANDIDATES)
        .map(|p| p.pid)
        .collect();

    let processes = curr
        .processes
        .iter()
        .map(|p| {
            let prev_p = prev_by_pid.get(&p.pid).copied();
            let probe_for_writer: &dyn ProcFsProbe =
                if top_write_pids.contains(&p.pid) { probe } else { &NoProcFsProbe };
            compute_process_rate(
                p,
                prev_p,
                dt,
                total_ticks_delta,
                ncpus,
                curr.mem.total as f64,
                probe_for_writer,
            )
        })
        .collect();

    let dstate_count = curr.processes.iter().filter(|p| p.state == 'D').count() as u32;

    let net_rx_drops: f64 = curr
        .interfaces
        .iter()
        .map(|n| {
            let p = prev.interfaces.iter().find(|p| p.name == n.name);
            p.map(|p| rate_u64(n.rx_drops, p.rx_drops, dt) + rate_u64(n.tx_drops, p.tx_drops, dt))
                .unwrap_or(0.0)
        })
        .sum();
    let net_errors: f64 = curr
        .interfaces
        .iter()
        .map(|n| {
            let p = prev.interfaces.iter().find(|p| p.name == n.name);
            p.map(|p| {
                rate_u64(n.rx_errors, p.rx_errors, dt) + rate_u64(n.tx_errors, p.tx_errors, dt)
            })
            .unwrap_or(0.0)
        })
        .sum();

    RateSnapshot {
        dt,
        user_pct,
        nice_pct,
        system_pct,
        idle_pct,
        iowait_pct,
        irq_pct,
        softirq_pct,
        steal_pct,
        cpu_pct: 100.0 - idle_pct,
        ctxswitch_rate: rate_u64(curr.stat.ctxt, prev.stat.ctxt, dt),
        forks_rate: rate_u64(curr.stat.processes, prev.stat.processes, dt),
        swap_in_mb_s,
        swap_out_mb_s,
        pgfault_rate: rate_u64(curr.vmstat.pgfault, prev.vmstat.pgfault, dt),
        pgmajfault_rate: rate_u64(curr.vmstat.pgmajfault, prev.vmstat.pgmajfault, dt),
        reclaim_direct_rate: rate_u64(curr.vmstat.pgsteal_direct, prev.vmstat.pgsteal_direct, dt),
        reclaim_kswapd_rate: rate_u64(
            curr.vmstat.pgsteal_kswapd,
            prev.vmstat.pgsteal_kswapd,
            dt,
        ),
        oom_kill_delta: delta_u64(curr.vmstat.oom_kill, prev.vmstat.oom_kill),
        dstate_count,
        disks,
        mounts,
        interfaces,
        tcp_retrans_rate: rate_u64(curr.tcp_snmp.retrans_segs, prev.tcp_snmp.retrans_segs, dt),
        net_errors_rate: net_errors,
        net_drops_pps: net_rx_drops,
        net_softirq_rate: rate_u64(curr.softirq.net_rx, prev.softirq.net_rx, dt)
            + rate_u64(curr.softirq.net_tx, prev.softirq.net_tx, dt),
        cgroups,
        processes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CpuTimes, DiskInfo, MountInfo, SystemStatInfo};

    fn snap(ts: i64) -> Snapshot {
        Snapshot { timestamp: ts, ..Default::default() }
    }

    #[test]
    fn delta_never_negative_on_counter_wrap() {
        assert_eq!(delta_u64(5, 10), 0);
        assert_eq!(delta_u64(10, 10), 0);
        assert_eq!(delta_u64(15, 10), 5);
    }

    #[test]
    fn dt_floors_at_one_second() {
        let prev = snap(100);
        let curr = snap(100);
        let r = compute_rates(&prev, &curr, &NoProcFsProbe);
        assert_eq!(r.dt, 1.0);
    }

    #[test]
    fn cpu_busy_is_complement_of_idle() {
        let mut prev = snap(0);
        prev.cpus = vec![CpuTimes { core_id: -1, idle: 1000, ..Default::default() }];
        let mut curr = snap(10);
        curr.cpus = vec![CpuTimes { core_id: -1, idle: 1000, user: 500, ..Default::default() }];
        let r = compute_rates(&prev, &curr, &NoProcFsProbe);
        assert!((r.cpu_pct - 100.0).abs() < 1e-9);
        assert!((r.user_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn disk_util_capped_at_100() {
        let mut prev = snap(0);
        prev.disks = vec![DiskInfo { device: "sda".into(), ..Default::default() }];
        let mut curr = snap(1);
        curr.disks = vec![DiskInfo { device: "sda".into(), io_time_ms: 5000, ..Default::default() }];
        let r = compute_rates(&prev, &curr, &NoProcFsProbe);
        assert_eq!(r.disks[0].util_pct, 100.0);
    }

    #[test]
    fn mount_growth_floors_at_zero_when_shrinking() {
        let mut prev = snap(0);
        prev.mounts = vec![MountInfo {
            mount_point: "/".into(),
            bytes_total: 1000,
            bytes_avail: 100,
            ..Default::default()
        }];
        let mut curr = snap(1);
        curr.mounts = vec![MountInfo {
            mount_point: "/".into(),
            bytes_total: 1000,
            bytes_avail: 500,
            ..Default::default()
        }];
        let r = compute_rates(&prev, &curr, &NoProcFsProbe);
        assert_eq!(r.mounts[0].growth_bytes_s, 0.0);
    }

    #[test]
    fn net_util_negative_one_when_speed_unknown() {
        let mut prev = snap(0);
        prev.interfaces = vec![crate::model::NetIfInfo { name: "eth0".into(), ..Default::default() }];
        let mut curr = snap(1);
        curr.interfaces =
            vec![crate::model::NetIfInfo { name: "eth0".into(), speed_mbps: None, ..Default::default() }];
        let r = compute_rates(&prev, &curr, &NoProcFsProbe);
        assert_eq!(r.interfaces[0].util_pct, -1.0);
    }

    #[test]
    fn process_cpu_pct_scales_by_ncpus() {
        let mut prev = snap(0);
        prev.stat = SystemStatInfo::default();
        prev.cpus = vec![CpuTimes { core_id: -1, ..Default::default() }, CpuTimes {
            core_id: 0,
            ..Default::default()
        }];
        prev.processes = vec![crate::model::ProcessInfo { pid: 1, utime: 0, stime: 0, ..Default::default() }];
        let mut curr = snap(1);
        // total ticks delta across all classes = 100 (from aggregate cpu line)
        curr.cpus = vec![CpuTimes { core_id: -1, user: 100, ..Default::default() }, CpuTimes {
            core_id: 0,
            ..Default::default()
        }];
        curr.processes =
            vec![crate::model::ProcessInfo { pid: 1, utime: 100, stime: 0, ..Default::default() }];
        let r = compute_rates(&prev, &curr, &NoProcFsProbe);
        // single core saturating: ticks_d=100, total_ticks_delta=100, ncpus=1 -> 100%
        assert!((r.processes[0].cpu_pct - 100.0).abs() < 1e-6);
    }

    #[test]
    fn service_name_resolution() {
        assert_eq!(
            resolve_service_name("/kubepods/besteffort/pod123/abcdef012345abcdef012345"),
            "k8s:abcdef012345"
        );
        assert_eq!(
            resolve_service_name("/system.slice/docker-abcdef012345abcdef012345.scope"),
            "docker:abcdef012345"
        );
        assert_eq!(resolve_service_name("/system.slice/nginx.service"), "nginx.service");
        assert_eq!(resolve_service_name("/user.slice/foo"), "");
    }

    #[test]
    fn top_writer_path_filters_non_regular_targets() {
        struct Probe;
        impl ProcFsProbe for Probe {
            fn fd_targets(&self, _pid: u32) -> Vec<FdTarget> {
                vec![
                    FdTarget { path: "socket:[1234]".into(), size_bytes: u64::MAX },
                    FdTarget { path: "/var/log/app.log (deleted)".into(), size_bytes: 1_000_000 },
                    FdTarget { path: "/data/table.ibd".into(), size_bytes: 5000 },
                    FdTarget { path: "/data/big.ibd".into(), size_bytes: 50_000 },
                ]
            }
        }
        assert_eq!(resolve_top_writer_path(&Probe, 1), "/data/big.ibd");
    }
}

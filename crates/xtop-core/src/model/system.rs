//! System-wide metrics captured once per tick.
//!
//! Every struct here is a plain value aggregate populated by an external
//! `Collector` (see [`crate::collector`]) from `/proc` and `/sys`. Field units
//! are documented where they are not self-evident; all counters are
//! monotonically non-decreasing between process restarts.

use serde::{Deserialize, Serialize};

/// One CPU time accumulator line from `/proc/stat`. `core_id == -1` is the
/// aggregate "cpu" line; `core_id >= 0` are individual cores. All fields are
/// jiffies (USER_HZ ticks) since boot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuTimes {
    pub core_id: i16,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Sum of all ten accounting classes. Used as the rate-calculation
    /// denominator.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }
}

/// `/proc/loadavg`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LoadInfo {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub nr_running: u32,
    pub nr_threads: u32,
}

/// One line (`some` or `full`) of a PSI resource file.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PsiLine {
    pub avg10: f64,
    pub avg60: f64,
    pub avg300: f64,
    /// Cumulative stall time, microseconds.
    pub total_stall_usec: u64,
}

/// `/proc/pressure/{cpu,memory,io}`. CPU has no `full` line.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PsiResource {
    pub some: PsiLine,
    pub full: Option<PsiLine>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PsiInfo {
    pub cpu: PsiResource,
    pub memory: PsiResource,
    pub io: PsiResource,
}

/// `/proc/meminfo`. All fields are kilobytes.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub slab: u64,
    pub mapped: u64,
    pub shmem: u64,
    pub kernel_stack: u64,
    pub page_tables: u64,
}

/// `/proc/vmstat` counters relevant to memory pressure. Cumulative since boot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct VmstatInfo {
    pub pgfault: u64,
    pub pgmajfault: u64,
    pub pswpin: u64,
    pub pswpout: u64,
    pub pgsteal_direct: u64,
    pub pgsteal_kswapd: u64,
    pub oom_kill: u64,
}

/// `/proc/diskstats`, one entry per block device. Counters are cumulative;
/// `sectors_*` are 512-byte sectors, `*_time_ms` and `io_time_ms` are
/// milliseconds.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskInfo {
    pub device: String,
    pub reads_completed: u64,
    pub reads_merged: u64,
    pub sectors_read: u64,
    pub read_time_ms: u64,
    pub writes_completed: u64,
    pub writes_merged: u64,
    pub sectors_written: u64,
    pub write_time_ms: u64,
    pub io_in_progress: u64,
    pub io_time_ms: u64,
    pub weighted_io_time_ms: u64,
}

/// A mounted filesystem (`statvfs`-derived). Byte/inode counts are point in
/// time, not cumulative.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MountInfo {
    pub mount_point: String,
    pub fs_type: String,
    pub bytes_total: u64,
    pub bytes_free: u64,
    pub bytes_avail: u64,
    pub inodes_total: u64,
    pub inodes_free: u64,
}

/// `/proc/net/dev` plus `/sys/class/net/<if>/{operstate,speed,master}`
/// metadata. Byte/packet/error/drop counters are cumulative.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetIfInfo {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_drops: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_drops: u64,
    /// "up", "down", "unknown", ...
    pub oper_state: String,
    /// None when the driver doesn't expose a link speed (e.g. virtual NICs).
    pub speed_mbps: Option<u32>,
    /// Bonding/bridge master interface, if any.
    pub master: Option<String>,
    /// "physical", "bridge", "bond", "veth", "loopback", ...
    pub kind: String,
}

/// `/proc/net/snmp` Tcp: section. Cumulative since boot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TcpSnmpInfo {
    pub active_opens: u64,
    pub passive_opens: u64,
    pub attempt_fails: u64,
    pub estab_resets: u64,
    pub retrans_segs: u64,
    pub in_errs: u64,
    pub out_rsts: u64,
}

/// `/proc/net/snmp` Udp: section. Cumulative since boot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct UdpSnmpInfo {
    pub in_datagrams: u64,
    pub no_ports: u64,
    pub in_errors: u64,
    pub out_datagrams: u64,
    pub rcvbuf_errors: u64,
    pub sndbuf_errors: u64,
}

/// `/proc/net/tcp{,6}` state histogram, counted at snapshot time.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TcpStateHisto {
    pub established: u32,
    pub syn_sent: u32,
    pub syn_recv: u32,
    pub fin_wait1: u32,
    pub fin_wait2: u32,
    pub time_wait: u32,
    pub close: u32,
    pub close_wait: u32,
    pub last_ack: u32,
    pub listen: u32,
    pub closing: u32,
}

impl TcpStateHisto {
    pub fn total(&self) -> u32 {
        self.established
            + self.syn_sent
            + self.syn_recv
            + self.fin_wait1
            + self.fin_wait2
            + self.time_wait
            + self.close
            + self.close_wait
            + self.last_ack
            + self.listen
            + self.closing
    }
}

/// `/proc/net/stat/nf_conntrack` plus `/proc/sys/net/netfilter/nf_conntrack_max`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ConntrackInfo {
    pub count: u64,
    pub max: u64,
    pub drops: u64,
    pub early_drops: u64,
}

/// `/proc/sys/fs/file-nr`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct FdInfo {
    pub alloc: u64,
    pub max: u64,
}

/// One process holding an unusually large share of ephemeral ports.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PortUser {
    pub pid: u32,
    pub comm: String,
    pub count: u32,
}

/// Ephemeral port exhaustion tracking, derived from `/proc/net/tcp{,6}` plus
/// `/proc/sys/net/ipv4/ip_local_port_range`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct EphemeralPortInfo {
    pub used: u32,
    pub range_size: u32,
    pub top_users: Vec<PortUser>,
}

/// One process accumulating CLOSE_WAIT sockets (usually means it isn't
/// closing connections the peer already ended).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CloseWaitLeaker {
    pub pid: u32,
    pub comm: String,
    pub count: u32,
}

/// `/proc/softirqs`, aggregated across cores. Cumulative since boot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SoftirqInfo {
    pub hi: u64,
    pub timer: u64,
    pub net_tx: u64,
    pub net_rx: u64,
    pub block: u64,
    pub irq_poll: u64,
    pub tasklet: u64,
    pub sched: u64,
    pub hrtimer: u64,
    pub rcu: u64,
}

/// `/proc/stat` trailer lines: `ctxt`, `processes`, `procs_running`,
/// `procs_blocked`. Cumulative since boot except the two `procs_*` gauges.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemStatInfo {
    pub ctxt: u64,
    /// Forks since boot (`processes` line).
    pub processes: u64,
    pub procs_running: u32,
    pub procs_blocked: u32,
}

impl SoftirqInfo {
    pub fn total(&self) -> u64 {
        self.hi
            + self.timer
            + self.net_tx
            + self.net_rx
            + self.block
            + self.irq_poll
            + self.tasklet
            + self.sched
            + self.hrtimer
            + self.rcu
    }
}

//! The top-level point-in-time capture handed between every component.

use serde::{Deserialize, Serialize};

use super::cgroup::CgroupInfo;
use super::process::ProcessInfo;
use super::sentinel::SentinelData;
use super::system::{
    CloseWaitLeaker, ConntrackInfo, CpuTimes, DiskInfo, EphemeralPortInfo, FdInfo, LoadInfo,
    MemInfo, MountInfo, NetIfInfo, PsiInfo, SoftirqInfo, SystemStatInfo, TcpSnmpInfo,
    TcpStateHisto, UdpSnmpInfo, VmstatInfo,
};

/// A complete sample of kernel counters at one point in time.
///
/// Snapshots remain valid even when individual collectors fail: a failure is
/// recorded in [`Snapshot::errors`] and the corresponding field is left at
/// its default rather than aborting collection (see ).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Snapshot {
    /// Unix timestamp, seconds, when collection for this snapshot began.
    pub timestamp: i64,

    pub psi: PsiInfo,
    pub cpus: Vec<CpuTimes>,
    pub load: LoadInfo,
    pub mem: MemInfo,
    pub vmstat: VmstatInfo,
    pub disks: Vec<DiskInfo>,
    pub mounts: Vec<MountInfo>,
    pub interfaces: Vec<NetIfInfo>,
    pub tcp_snmp: TcpSnmpInfo,
    pub udp_snmp: UdpSnmpInfo,
    pub tcp_states: TcpStateHisto,
    pub conntrack: ConntrackInfo,
    pub fd: FdInfo,
    pub ephemeral_ports: EphemeralPortInfo,
    pub close_wait_leakers: Vec<CloseWaitLeaker>,
    pub softirq: SoftirqInfo,
    pub stat: SystemStatInfo,
    pub sentinel: SentinelData,

    pub cgroups: Vec<CgroupInfo>,
    pub processes: Vec<ProcessInfo>,

    /// Soft collector failures for this tick. The snapshot otherwise remains
    /// usable — see  (collector soft failure).
    pub errors: Vec<String>,
}

impl Snapshot {
    /// Aggregate ("cpu") line from `/proc/stat`, if collected.
    pub fn aggregate_cpu(&self) -> Option<&CpuTimes> {
        self.cpus.iter().find(|c| c.core_id == -1)
    }

    pub fn cgroup(&self, path: &str) -> Option<&CgroupInfo> {
        self.cgroups.iter().find(|c| c.path == path)
    }
}

//! Plain value types shared by every component: the kernel sample
//! ([`snapshot::Snapshot`]) and its nested blocks.

pub mod cgroup;
pub mod process;
pub mod sentinel;
pub mod snapshot;
pub mod system;

pub use cgroup::{CgroupCpu, CgroupInfo, CgroupIo, CgroupMemory, CgroupPids};
pub use process::ProcessInfo;
pub use sentinel::{SentinelData, BENIGN_DROP_REASONS};
pub use snapshot::Snapshot;
pub use system::{
    CloseWaitLeaker, ConntrackInfo, CpuTimes, DiskInfo, EphemeralPortInfo, FdInfo, LoadInfo,
    MemInfo, MountInfo, NetIfInfo, PortUser, PsiInfo, PsiLine, PsiResource, SoftirqInfo,
    SystemStatInfo, TcpSnmpInfo, TcpStateHisto, UdpSnmpInfo, VmstatInfo,
};

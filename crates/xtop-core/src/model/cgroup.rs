//! Cgroup v2 metrics, one entry per path in the cgroup tree.
//!
//! Source: `/sys/fs/cgroup/<path>/{cpu.stat,memory.current,memory.max,
//! memory.swap.current,memory.events,io.stat,pids.current,pids.max}`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupCpu {
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
    pub nr_periods: u64,
    pub nr_throttled: u64,
    pub throttled_usec: u64,
    /// `cpu.max` quota/period, when a limit is set.
    pub quota: Option<i64>,
    pub period: Option<i64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupMemory {
    pub current: u64,
    /// `None` when the controller reports "max" (unlimited).
    pub limit: Option<u64>,
    pub swap_current: u64,
    pub swap_limit: Option<u64>,
    /// Cumulative OOM kill count from `memory.events`.
    pub oom_kill: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupIo {
    pub rbytes: u64,
    pub wbytes: u64,
    pub rios: u64,
    pub wios: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupPids {
    pub current: u64,
    pub limit: Option<u64>,
}

/// One node in the cgroup tree. Any of `cpu`/`memory`/`io`/`pids` may be
/// absent if the corresponding controller isn't delegated to this path.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupInfo {
    /// Path relative to the cgroup2 mount, e.g. `/system.slice/foo.service`.
    pub path: String,
    pub cpu: Option<CgroupCpu>,
    pub memory: Option<CgroupMemory>,
    pub io: Option<CgroupIo>,
    pub pids: Option<CgroupPids>,
}

//! Per-process metrics.
//!
//! Source: `/proc/<pid>/{stat,status,io,cgroup,fd}`. All tick-based fields
//! (`utime`/`stime`/`start_time_ticks`) are USER_HZ jiffies, matching
//! [`super::system::CpuTimes`].

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub comm: String,
    /// Single-character process state (`R`, `S`, `D`, `Z`, `T`, ...).
    pub state: char,
    pub ppid: u32,
    /// Cgroup path this process belongs to, empty if cgroups aren't in use.
    pub cgroup_path: String,
    pub utime: u64,
    pub stime: u64,
    pub rss_kb: u64,
    pub vm_size_kb: u64,
    pub vm_swap_kb: u64,
    pub minflt: u64,
    pub majflt: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
    pub num_threads: u32,
    pub fd_count: u32,
    pub fd_limit_soft: u64,
    /// Process start time, jiffies since boot (`/proc/<pid>/stat` field 22).
    pub start_time_ticks: u64,
}

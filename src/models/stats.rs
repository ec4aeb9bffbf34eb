// Per-container stats models

use serde::{Deserialize, Serialize};

/// One raw stats reading from the control plane. CPU fields are cumulative
/// counters; deltas are taken against the previous sample for the same
/// logical container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSample {
    pub cpu_total: u64,
    pub cpu_system: u64,
    pub online_cpus: u32,
    pub mem_usage: u64,
    /// Page cache portion of `mem_usage` (cgroup "cache", or "inactive_file"
    /// on cgroup v2 hosts).
    pub mem_cache: u64,
    pub mem_limit: u64,
    /// Unix millis when the sample was taken.
    pub timestamp: u64,
}

/// Derived stats for one container. `cpu_percent` is absent on the first poll
/// and after a counter reset, when no valid delta exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothedStats {
    pub cpu_percent: Option<f64>,
    pub mem_used_mib: f64,
    pub mem_percent: f64,
}

/// Latest published state for one container identity. A failed poll keeps the
/// previous `stats` value; `stale` flips once failures pass the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatsState {
    pub stats: SmoothedStats,
    pub stale: bool,
    pub consecutive_failures: u32,
    /// Unix millis of the last successful poll.
    pub updated_at: u64,
}

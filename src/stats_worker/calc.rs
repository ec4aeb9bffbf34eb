// Pure stats math: CPU deltas, memory accounting, smoothing

use crate::models::StatsSample;

pub const BYTES_PER_MIB: f64 = 1048576.0;

/// CPU% across the window between two samples:
/// (cpu_delta / system_delta) * online_cpus * 100.
///
/// None when no valid window exists: a negative cpu delta (counter reset
/// after recreation) or a non-positive system delta. A zero cpu delta with a
/// valid system delta is a genuine 0.0.
pub fn cpu_percent(previous: &StatsSample, current: &StatsSample) -> Option<f64> {
    let cpu_delta = current.cpu_total as i128 - previous.cpu_total as i128;
    let system_delta = current.cpu_system as i128 - previous.cpu_system as i128;
    if cpu_delta < 0 || system_delta <= 0 {
        return None;
    }
    let cpus = current.online_cpus.max(1) as f64;
    Some((cpu_delta as f64 / system_delta as f64) * cpus * 100.0)
}

/// Memory in active use. With `exclude_cache` the page cache is subtracted,
/// floored at zero.
pub fn memory_used_bytes(sample: &StatsSample, exclude_cache: bool) -> u64 {
    if exclude_cache {
        sample.mem_usage.saturating_sub(sample.mem_cache)
    } else {
        sample.mem_usage
    }
}

/// Used memory as a percentage of the limit; 0.0 when no limit is set.
pub fn memory_percent(sample: &StatsSample, used_bytes: u64) -> f64 {
    if sample.mem_limit == 0 {
        return 0.0;
    }
    (used_bytes as f64 / sample.mem_limit as f64) * 100.0
}

pub fn to_mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

/// One EWMA step: alpha * raw + (1 - alpha) * previous. With alpha == 0 or no
/// previous value the raw value passes through unchanged.
pub fn ewma(alpha: f64, raw: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(prev) if alpha > 0.0 => alpha * raw + (1.0 - alpha) * prev,
        _ => raw,
    }
}

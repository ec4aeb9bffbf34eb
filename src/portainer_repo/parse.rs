// Wire-format decoding: control-plane JSON into domain models

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::models::{
    Container, ContainerState, Endpoint, EndpointId, EndpointStatus, Stack, StackId,
    StackProvenance, StatsSample,
};

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEndpoint {
    id: i64,
    name: String,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    snapshots: Vec<WireEndpointSnapshot>,
}

// The control plane embeds its latest probe of each endpoint as Snapshots[0].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEndpointSnapshot {
    #[serde(default)]
    docker_version: String,
    #[serde(default)]
    swarm: bool,
    #[serde(rename = "TotalCPU", default)]
    total_cpu: u64,
    #[serde(default)]
    total_memory: u64,
    #[serde(default)]
    running_container_count: u64,
    #[serde(default)]
    stopped_container_count: u64,
}

pub(super) fn endpoints(body: &[u8]) -> Result<Vec<Endpoint>, serde_json::Error> {
    let wire: Vec<WireEndpoint> = serde_json::from_slice(body)?;
    Ok(wire
        .into_iter()
        .map(|w| {
            let snap = w.snapshots.into_iter().next().unwrap_or_default();
            Endpoint {
                id: w.id,
                name: w.name,
                status: EndpointStatus::from_code(w.status),
                docker_version: snap.docker_version,
                swarm: snap.swarm,
                total_cpu: snap.total_cpu,
                total_memory: snap.total_memory,
                running_container_count: snap.running_container_count,
                stopped_container_count: snap.stopped_container_count,
            }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStack {
    id: i64,
    name: String,
    #[serde(default)]
    endpoint_id: i64,
}

pub(super) fn stacks(body: &[u8]) -> Result<Vec<Stack>, serde_json::Error> {
    let wire: Vec<WireStack> = serde_json::from_slice(body)?;
    Ok(wire
        .into_iter()
        .map(|w| Stack {
            id: StackId::Native(w.id),
            name: w.name,
            endpoint_id: w.endpoint_id,
            provenance: StackProvenance::Native,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireContainer {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

pub(super) fn containers(
    endpoint_id: EndpointId,
    body: &[u8],
) -> Result<Vec<Container>, serde_json::Error> {
    let wire: Vec<WireContainer> = serde_json::from_slice(body)?;
    Ok(wire
        .into_iter()
        .map(|w| {
            let name = w
                .names
                .first()
                .map(|n| n.trim_start_matches('/').to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| w.id.chars().take(12).collect());
            Container {
                raw_id: w.id,
                endpoint_id,
                name,
                image: w.image,
                state: ContainerState::from_docker(&w.state),
                stack_id: None,
                compose_project: w.labels.get(COMPOSE_PROJECT_LABEL).cloned(),
                compose_service: w.labels.get(COMPOSE_SERVICE_LABEL).cloned(),
            }
        })
        .collect())
}

#[derive(Debug, Default, Deserialize)]
struct WireStats {
    #[serde(default)]
    cpu_stats: WireCpuStats,
    #[serde(default)]
    memory_stats: WireMemoryStats,
}

#[derive(Debug, Default, Deserialize)]
struct WireCpuStats {
    #[serde(default)]
    cpu_usage: WireCpuUsage,
    #[serde(default)]
    system_cpu_usage: u64,
    #[serde(default)]
    online_cpus: u32,
}

#[derive(Debug, Default, Deserialize)]
struct WireCpuUsage {
    #[serde(default)]
    total_usage: u64,
    #[serde(default)]
    percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMemoryStats {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    stats: WireMemoryDetail,
}

#[derive(Debug, Default, Deserialize)]
struct WireMemoryDetail {
    #[serde(default)]
    cache: u64,
    #[serde(default)]
    inactive_file: u64,
}

pub(super) fn stats_sample(body: &[u8]) -> Result<StatsSample, serde_json::Error> {
    let wire: WireStats = serde_json::from_slice(body)?;
    let online_cpus = if wire.cpu_stats.online_cpus > 0 {
        wire.cpu_stats.online_cpus
    } else {
        wire.cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len() as u32)
            .filter(|&n| n > 0)
            .unwrap_or(1)
    };
    // cgroup v2 hosts report no "cache"; inactive_file is the equivalent.
    let mem_cache = if wire.memory_stats.stats.cache > 0 {
        wire.memory_stats.stats.cache
    } else {
        wire.memory_stats.stats.inactive_file
    };
    Ok(StatsSample {
        cpu_total: wire.cpu_stats.cpu_usage.total_usage,
        cpu_system: wire.cpu_stats.system_cpu_usage,
        online_cpus,
        mem_usage: wire.memory_stats.usage,
        mem_cache,
        mem_limit: wire.memory_stats.limit,
        timestamp: now_ms(),
    })
}

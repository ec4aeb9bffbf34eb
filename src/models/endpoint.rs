// Control-plane endpoint models

use serde::{Deserialize, Serialize};

use super::EndpointId;

/// Endpoint reachability as reported by the control plane (1 = up, 2 = down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Up,
    Down,
    #[serde(other)]
    Unknown,
}

impl EndpointStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => EndpointStatus::Up,
            2 => EndpointStatus::Down,
            _ => EndpointStatus::Unknown,
        }
    }
}

/// One endpoint with the detail the control plane embeds in its latest
/// snapshot record (docker version, totals, container counts).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub status: EndpointStatus,
    #[serde(default)]
    pub docker_version: String,
    #[serde(default)]
    pub swarm: bool,
    #[serde(default)]
    pub total_cpu: u64,
    #[serde(default)]
    pub total_memory: u64,
    #[serde(default)]
    pub running_container_count: u64,
    #[serde(default)]
    pub stopped_container_count: u64,
}

impl Endpoint {
    pub fn is_up(&self) -> bool {
        self.status == EndpointStatus::Up
    }
}

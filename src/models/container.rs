// Container models and the logical identity key

use std::fmt;

use serde::{Deserialize, Serialize};

/// Control-plane endpoint id (numeric in the REST API).
pub type EndpointId = i64;

/// Stable logical identity of a container across recreation.
///
/// Primary form is "<endpoint_id>:<name>"; after a rename detected through
/// compose labels the key takes the form "<endpoint_id>:<project>/<service>"
/// and stays in that form for the lifetime of the entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerKey(String);

impl ContainerKey {
    /// Name-based key: "<endpoint_id>:<name>".
    pub fn named(endpoint_id: EndpointId, name: &str) -> Self {
        Self(format!("{endpoint_id}:{name}"))
    }

    /// Compose-based fallback key: "<endpoint_id>:<project>/<service>".
    pub fn compose(endpoint_id: EndpointId, project: &str, service: &str) -> Self {
        Self(format!("{endpoint_id}:{project}/{service}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContainerKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Container state as Docker reports it; lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Restarting,
    Paused,
    Created,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from the Docker API state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            "created" => ContainerState::Created,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    /// Running or restarting counts as active for control and counting purposes.
    pub fn is_active(&self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Restarting)
    }
}

/// One container as fetched this cycle. `raw_id` changes on every recreation;
/// `name` and the compose labels are the durable identity surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub raw_id: String,
    pub endpoint_id: EndpointId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Parent stack, assigned during synthesis; None when the container is
    /// parented directly to its endpoint.
    #[serde(default)]
    pub stack_id: Option<super::StackId>,
    #[serde(default)]
    pub compose_project: Option<String>,
    #[serde(default)]
    pub compose_service: Option<String>,
}

impl Container {
    /// Name-based identity key for this container.
    pub fn primary_key(&self) -> ContainerKey {
        ContainerKey::named(self.endpoint_id, &self.name)
    }

    /// Compose-based fallback key, when both labels are present.
    pub fn compose_key(&self) -> Option<ContainerKey> {
        match (&self.compose_project, &self.compose_service) {
            (Some(p), Some(s)) => Some(ContainerKey::compose(self.endpoint_id, p, s)),
            _ => None,
        }
    }

    pub fn matches_compose(&self, project: &str, service: &str) -> bool {
        self.compose_project.as_deref() == Some(project)
            && self.compose_service.as_deref() == Some(service)
    }
}

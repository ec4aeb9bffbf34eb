// Container label resolution

use serde::{Deserialize, Serialize};

use crate::models::Container;

/// How a container entity is labelled. Changing the mode only changes the
/// visible label, never any stable identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMode {
    /// Compose service name, falling back to the container name.
    #[default]
    Service,
    /// Raw container name, always.
    Container,
    /// "<project>/<service>", falling back to the container name.
    StackService,
}

/// Short label for a container under the configured mode.
pub fn entity_label(container: &Container, mode: NameMode) -> String {
    match mode {
        NameMode::Service => container
            .compose_service
            .clone()
            .unwrap_or_else(|| container.name.clone()),
        NameMode::Container => container.name.clone(),
        NameMode::StackService => {
            match (&container.compose_project, &container.compose_service) {
                (Some(project), Some(service)) => format!("{project}/{service}"),
                _ => container.name.clone(),
            }
        }
    }
}

/// Descriptive long-form device name, independent of the label mode.
pub fn device_name(container: &Container) -> String {
    match (&container.compose_project, &container.compose_service) {
        (Some(project), Some(service)) => format!("Container: {project}/{service}"),
        _ => format!("Container: {}", container.name),
    }
}

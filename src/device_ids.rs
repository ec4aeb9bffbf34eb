// Stable device identifiers and the endpoint -> stack -> container hierarchy

use serde::{Deserialize, Serialize};

use crate::models::{Container, Endpoint, Snapshot, Stack, StackKey};
use crate::naming;

/// One node in the exposed device hierarchy. `via` names the parent device id;
/// the chain is at most endpoint -> stack -> container, no cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub via: Option<String>,
}

/// Lowercase a value and squash every non-alphanumeric run to one underscore.
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut gap = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    out
}

pub fn endpoint_device_id(endpoint_id: i64) -> String {
    format!("endpoint_{endpoint_id}")
}

pub fn stack_device_id(stack: &Stack) -> String {
    format!("stack_{}_{}", stack.endpoint_id, slug(&stack.name))
}

/// Container device id. The compose form is preferred so the id survives
/// recreation under a different container name.
pub fn container_device_id(container: &Container) -> String {
    match (&container.compose_project, &container.compose_service) {
        (Some(project), Some(service)) => format!(
            "container_{}_{}_{}",
            container.endpoint_id,
            slug(project),
            slug(service)
        ),
        _ => format!(
            "container_{}_{}",
            container.endpoint_id,
            slug(&container.name)
        ),
    }
}

pub fn endpoint_device(endpoint: &Endpoint) -> DeviceRef {
    DeviceRef {
        id: endpoint_device_id(endpoint.id),
        name: format!("Endpoint: {}", endpoint.name),
        via: None,
    }
}

pub fn stack_device(stack: &Stack) -> DeviceRef {
    DeviceRef {
        id: stack_device_id(stack),
        name: format!("Stack: {}", stack.name),
        via: Some(endpoint_device_id(stack.endpoint_id)),
    }
}

pub fn container_device(container: &Container, snapshot: &Snapshot) -> DeviceRef {
    let via = container
        .stack_id
        .as_ref()
        .and_then(|id| snapshot.stack(&StackKey::new(container.endpoint_id, id)))
        .map(stack_device_id)
        .unwrap_or_else(|| endpoint_device_id(container.endpoint_id));
    DeviceRef {
        id: container_device_id(container),
        name: naming::device_name(container),
        via: Some(via),
    }
}

/// Full hierarchy for a snapshot: endpoints first, then stacks, then indexed
/// containers, each pointing at its parent.
pub fn device_tree(snapshot: &Snapshot) -> Vec<DeviceRef> {
    let mut out = Vec::new();
    for endpoint in snapshot.endpoints.values() {
        out.push(endpoint_device(endpoint));
    }
    for stack in snapshot.stacks.values() {
        out.push(stack_device(stack));
    }
    for (_, container) in snapshot.containers_indexed() {
        out.push(container_device(container, snapshot));
    }
    out
}

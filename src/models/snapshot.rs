// Per-cycle topology snapshot, published atomically

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Container, ContainerKey, Endpoint, EndpointId, Stack, StackKey};

/// One identity-key transition detected this cycle (compose-label rename).
/// Consumers holding per-key state move it from `previous` to `current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyTransition {
    pub previous: ContainerKey,
    pub current: ContainerKey,
}

/// Per-endpoint collections that failed to load this cycle and were treated
/// as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialData {
    pub stacks_failed: Vec<EndpointId>,
    pub containers_failed: Vec<EndpointId>,
}

impl PartialData {
    pub fn is_empty(&self) -> bool {
        self.stacks_failed.is_empty() && self.containers_failed.is_empty()
    }
}

/// Immutable result of one fetch cycle. Containers live in a flat arena;
/// `containers_by_name` maps logical identity keys to arena indices. Entities
/// reference each other by plain ids only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cycle: u64,
    /// Unix millis when the cycle's fetch completed.
    pub fetched_at: u64,
    pub endpoints: BTreeMap<EndpointId, Endpoint>,
    pub stacks: BTreeMap<StackKey, Stack>,
    pub containers: Vec<Container>,
    pub containers_by_name: BTreeMap<ContainerKey, usize>,
    #[serde(default)]
    pub rekeyed: Vec<KeyTransition>,
    #[serde(default)]
    pub partial: PartialData,
}

/// Container counts for one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackCounts {
    pub running: u64,
    pub stopped: u64,
    pub total: u64,
}

impl Snapshot {
    /// The pre-first-cycle value: cycle 0, everything empty.
    pub fn empty() -> Self {
        Self {
            cycle: 0,
            fetched_at: 0,
            endpoints: BTreeMap::new(),
            stacks: BTreeMap::new(),
            containers: Vec::new(),
            containers_by_name: BTreeMap::new(),
            rekeyed: Vec::new(),
            partial: PartialData::default(),
        }
    }

    pub fn container(&self, key: &ContainerKey) -> Option<&Container> {
        self.containers_by_name
            .get(key)
            .and_then(|&idx| self.containers.get(idx))
    }

    /// Endpoint id and current raw id for a key, for dispatching actions.
    pub fn container_location(&self, key: &ContainerKey) -> Option<(EndpointId, &str)> {
        self.container(key)
            .map(|c| (c.endpoint_id, c.raw_id.as_str()))
    }

    /// Indexed containers in key order.
    pub fn containers_indexed(&self) -> impl Iterator<Item = (&ContainerKey, &Container)> {
        self.containers_by_name
            .iter()
            .filter_map(|(key, &idx)| self.containers.get(idx).map(|c| (key, c)))
    }

    pub fn stack(&self, key: &StackKey) -> Option<&Stack> {
        self.stacks.get(key)
    }

    /// Member counts for one stack, matched by the parent id assigned during
    /// synthesis.
    pub fn stack_counts(&self, stack: &Stack) -> StackCounts {
        let mut counts = StackCounts {
            running: 0,
            stopped: 0,
            total: 0,
        };
        for c in &self.containers {
            if c.endpoint_id != stack.endpoint_id || c.stack_id.as_ref() != Some(&stack.id) {
                continue;
            }
            counts.total += 1;
            if c.state.is_active() {
                counts.running += 1;
            } else {
                counts.stopped += 1;
            }
        }
        counts
    }
}

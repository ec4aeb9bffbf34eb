// Shared test helpers: an in-memory control plane and entity builders
// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use stackwatch::models::*;
use stackwatch::portainer_repo::{ApiError, ContainerAction, ControlPlane, StackAction};

fn status_error(path: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        path: path.to_string(),
    }
}

#[derive(Default)]
struct FakeWorld {
    endpoints: Vec<Endpoint>,
    stacks: HashMap<EndpointId, Vec<Stack>>,
    containers: HashMap<EndpointId, Vec<Container>>,
    stats: HashMap<String, VecDeque<StatsSample>>,
    hung_stats: HashSet<String>,
    fail_endpoints: bool,
    fail_stacks: bool,
    fail_containers: bool,
}

/// In-memory control plane. Tests mutate the world between cycles; lifecycle
/// actions are recorded, not applied. Stats samples are consumed one per
/// poll; an exhausted queue reads as a failed poll.
#[derive(Default)]
pub struct FakeControlPlane {
    world: Mutex<FakeWorld>,
    actions: Mutex<Vec<String>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_endpoints(&self, endpoints: Vec<Endpoint>) {
        self.world.lock().unwrap().endpoints = endpoints;
    }

    pub fn set_stacks(&self, endpoint_id: EndpointId, stacks: Vec<Stack>) {
        self.world.lock().unwrap().stacks.insert(endpoint_id, stacks);
    }

    pub fn set_containers(&self, endpoint_id: EndpointId, containers: Vec<Container>) {
        self.world
            .lock()
            .unwrap()
            .containers
            .insert(endpoint_id, containers);
    }

    pub fn push_stats(&self, raw_id: &str, sample: StatsSample) {
        self.world
            .lock()
            .unwrap()
            .stats
            .entry(raw_id.to_string())
            .or_default()
            .push_back(sample);
    }

    /// Stats polls for this raw id never complete.
    pub fn hang_stats(&self, raw_id: &str) {
        self.world
            .lock()
            .unwrap()
            .hung_stats
            .insert(raw_id.to_string());
    }

    pub fn fail_endpoints(&self, fail: bool) {
        self.world.lock().unwrap().fail_endpoints = fail;
    }

    pub fn fail_stacks(&self, fail: bool) {
        self.world.lock().unwrap().fail_stacks = fail;
    }

    pub fn fail_containers(&self, fail: bool) {
        self.world.lock().unwrap().fail_containers = fail;
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }
}

impl ControlPlane for FakeControlPlane {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>, ApiError> {
        let world = self.world.lock().unwrap();
        if world.fail_endpoints {
            return Err(status_error("api/endpoints"));
        }
        Ok(world.endpoints.clone())
    }

    async fn list_stacks(&self, endpoint_id: EndpointId) -> Result<Vec<Stack>, ApiError> {
        let world = self.world.lock().unwrap();
        if world.fail_stacks {
            return Err(status_error("api/stacks"));
        }
        Ok(world.stacks.get(&endpoint_id).cloned().unwrap_or_default())
    }

    async fn list_containers(&self, endpoint_id: EndpointId) -> Result<Vec<Container>, ApiError> {
        let world = self.world.lock().unwrap();
        if world.fail_containers {
            return Err(status_error("containers/json"));
        }
        Ok(world
            .containers
            .get(&endpoint_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn container_stats(
        &self,
        _endpoint_id: EndpointId,
        raw_id: &str,
    ) -> Result<StatsSample, ApiError> {
        let next = {
            let mut world = self.world.lock().unwrap();
            if world.hung_stats.contains(raw_id) {
                None
            } else {
                Some(
                    world
                        .stats
                        .get_mut(raw_id)
                        .and_then(|queue| queue.pop_front())
                        .ok_or_else(|| status_error("stats")),
                )
            }
        };
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn container_action(
        &self,
        endpoint_id: EndpointId,
        raw_id: &str,
        action: ContainerAction,
    ) -> Result<(), ApiError> {
        self.actions
            .lock()
            .unwrap()
            .push(format!("container {endpoint_id} {raw_id} {}", action.as_str()));
        Ok(())
    }

    async fn stack_action(
        &self,
        endpoint_id: EndpointId,
        stack_id: i64,
        action: StackAction,
    ) -> Result<(), ApiError> {
        self.actions
            .lock()
            .unwrap()
            .push(format!("stack {endpoint_id} {stack_id} {}", action.as_str()));
        Ok(())
    }
}

pub fn endpoint(id: EndpointId, name: &str) -> Endpoint {
    Endpoint {
        id,
        name: name.into(),
        status: EndpointStatus::Up,
        docker_version: "27.0.3".into(),
        swarm: false,
        total_cpu: 4,
        total_memory: 8 * 1024 * 1024 * 1024,
        running_container_count: 0,
        stopped_container_count: 0,
    }
}

pub fn container(endpoint_id: EndpointId, raw_id: &str, name: &str) -> Container {
    Container {
        raw_id: raw_id.into(),
        endpoint_id,
        name: name.into(),
        image: "nginx:1.27".into(),
        state: ContainerState::Running,
        stack_id: None,
        compose_project: None,
        compose_service: None,
    }
}

pub fn compose_container(
    endpoint_id: EndpointId,
    raw_id: &str,
    name: &str,
    project: &str,
    service: &str,
) -> Container {
    let mut c = container(endpoint_id, raw_id, name);
    c.compose_project = Some(project.into());
    c.compose_service = Some(service.into());
    c
}

pub fn native_stack(endpoint_id: EndpointId, id: i64, name: &str) -> Stack {
    Stack {
        id: StackId::Native(id),
        name: name.into(),
        endpoint_id,
        provenance: StackProvenance::Native,
    }
}

pub fn sample(cpu_total: u64, cpu_system: u64, mem_usage: u64) -> StatsSample {
    StatsSample {
        cpu_total,
        cpu_system,
        online_cpus: 2,
        mem_usage,
        mem_cache: 0,
        mem_limit: 1024 * 1024 * 1024,
        timestamp: 0,
    }
}

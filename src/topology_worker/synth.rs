// Stack synthesis and parent assignment for one endpoint

use std::collections::BTreeMap;

use crate::device_ids::slug;
use crate::models::{Container, EndpointId, Stack, StackId, StackKey, StackProvenance};

/// Deterministic id for a stack synthesized from a compose project. The same
/// (endpoint, project) pair yields the same id on every cycle.
pub fn synthetic_stack_id(endpoint_id: EndpointId, project: &str) -> StackId {
    StackId::Synthetic(format!("synth-{endpoint_id}-{}", slug(project)))
}

/// Completes the stack set for one endpoint and assigns each container's
/// parent. Native stacks win by name; a compose project with no native stack
/// gets a synthesized stack; unlabeled containers stay parented to the
/// endpoint (stack_id = None).
pub fn assign_stacks(
    endpoint_id: EndpointId,
    native: Vec<Stack>,
    containers: &mut [Container],
) -> BTreeMap<StackKey, Stack> {
    let mut stacks: BTreeMap<StackKey, Stack> = BTreeMap::new();
    let mut by_name: BTreeMap<String, StackId> = BTreeMap::new();
    for stack in native {
        by_name.insert(stack.name.clone(), stack.id.clone());
        stacks.insert(stack.key(), stack);
    }

    for container in containers
        .iter_mut()
        .filter(|c| c.endpoint_id == endpoint_id)
    {
        let Some(project) = container.compose_project.clone() else {
            container.stack_id = None;
            continue;
        };
        let id = match by_name.get(&project) {
            Some(id) => id.clone(),
            None => {
                let id = synthetic_stack_id(endpoint_id, &project);
                let stack = Stack {
                    id: id.clone(),
                    name: project.clone(),
                    endpoint_id,
                    provenance: StackProvenance::Synthesized,
                };
                by_name.insert(project, id.clone());
                stacks.insert(stack.key(), stack);
                id
            }
        };
        container.stack_id = Some(id);
    }
    stacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerState;

    fn container(name: &str, project: Option<&str>) -> Container {
        Container {
            raw_id: "aaa".into(),
            endpoint_id: 1,
            name: name.into(),
            image: "nginx:latest".into(),
            state: ContainerState::Running,
            stack_id: None,
            compose_project: project.map(Into::into),
            compose_service: Some("web".into()),
        }
    }

    fn native_stack(id: i64, name: &str) -> Stack {
        Stack {
            id: StackId::Native(id),
            name: name.into(),
            endpoint_id: 1,
            provenance: StackProvenance::Native,
        }
    }

    #[test]
    fn synthetic_ids_are_deterministic() {
        assert_eq!(
            synthetic_stack_id(1, "My App"),
            synthetic_stack_id(1, "My App")
        );
        assert_eq!(
            synthetic_stack_id(1, "My App"),
            StackId::Synthetic("synth-1-my_app".into())
        );
        assert_ne!(synthetic_stack_id(1, "myapp"), synthetic_stack_id(2, "myapp"));
    }

    #[test]
    fn native_stack_wins_by_project_name() {
        let mut containers = vec![container("myapp-web-1", Some("myapp"))];
        let stacks = assign_stacks(1, vec![native_stack(4, "myapp")], &mut containers);
        assert_eq!(stacks.len(), 1);
        assert_eq!(containers[0].stack_id, Some(StackId::Native(4)));
    }

    #[test]
    fn missing_native_stack_is_synthesized_once() {
        let mut containers = vec![
            container("myapp-web-1", Some("myapp")),
            container("myapp-db-1", Some("myapp")),
        ];
        let stacks = assign_stacks(1, Vec::new(), &mut containers);
        assert_eq!(stacks.len(), 1);
        let stack = stacks.values().next().unwrap();
        assert_eq!(stack.provenance, StackProvenance::Synthesized);
        assert_eq!(stack.name, "myapp");
        assert_eq!(containers[0].stack_id, Some(stack.id.clone()));
        assert_eq!(containers[1].stack_id, Some(stack.id.clone()));
    }

    #[test]
    fn unlabeled_container_parents_to_endpoint() {
        let mut containers = vec![container("standalone", None)];
        let stacks = assign_stacks(1, Vec::new(), &mut containers);
        assert!(stacks.is_empty());
        assert_eq!(containers[0].stack_id, None);
    }

    #[test]
    fn native_stacks_survive_without_members() {
        let mut containers = vec![container("standalone", None)];
        let stacks = assign_stacks(1, vec![native_stack(9, "idle")], &mut containers);
        assert_eq!(stacks.len(), 1);
        assert!(stacks.values().next().unwrap().is_native());
    }

    #[test]
    fn mixed_native_and_synthesized() {
        let mut containers = vec![
            container("myapp-web-1", Some("myapp")),
            container("side-tool-1", Some("sidetool")),
        ];
        let stacks = assign_stacks(1, vec![native_stack(4, "myapp")], &mut containers);
        assert_eq!(stacks.len(), 2);
        assert_eq!(containers[0].stack_id, Some(StackId::Native(4)));
        assert_eq!(
            containers[1].stack_id,
            Some(StackId::Synthetic("synth-1-sidetool".into()))
        );
    }
}

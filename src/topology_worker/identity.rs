// Logical identity resolution across container recreation

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{Container, ContainerKey, Snapshot};

/// How a raw container mapped onto the known entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Same entity as last cycle, indexed under `key`.
    Continuous(ContainerKey),
    /// The entity indexed under `previous` last cycle; from now on it keeps
    /// the compose-form `key`.
    Renamed {
        key: ContainerKey,
        previous: ContainerKey,
    },
    /// No prior entity matched.
    New(ContainerKey),
}

impl Resolution {
    pub fn key(&self) -> &ContainerKey {
        match self {
            Resolution::Continuous(key) => key,
            Resolution::Renamed { key, .. } => key,
            Resolution::New(key) => key,
        }
    }
}

/// Count, per compose key, of current containers that would attempt the
/// compose fallback this cycle (their name key misses the previous index).
/// More than one contender for the same key means the fallback is ambiguous.
pub fn fallback_contenders(
    current: &[Container],
    previous: &Snapshot,
) -> HashMap<ContainerKey, u32> {
    let mut out: HashMap<ContainerKey, u32> = HashMap::new();
    for container in current {
        if previous
            .containers_by_name
            .contains_key(&container.primary_key())
        {
            continue;
        }
        if let Some(key) = container.compose_key() {
            *out.entry(key).or_insert(0) += 1;
        }
    }
    out
}

/// Resolve one container against the previous snapshot.
///
/// A name match always wins. The compose fallback applies only when the name
/// is gone, the labels point at exactly one prior entity that is itself gone
/// by name, and nothing else claimed the compose key this cycle. Every
/// ambiguous case yields a new entity; a wrong merge is worse than an extra
/// entity.
pub fn resolve(
    container: &Container,
    previous: &Snapshot,
    current_names: &HashSet<ContainerKey>,
    claimed: &HashSet<ContainerKey>,
    contenders: &HashMap<ContainerKey, u32>,
) -> Resolution {
    let primary = container.primary_key();
    if previous.containers_by_name.contains_key(&primary) {
        return Resolution::Continuous(primary);
    }

    let (project, service) = match (&container.compose_project, &container.compose_service) {
        (Some(p), Some(s)) => (p.as_str(), s.as_str()),
        _ => return Resolution::New(primary),
    };
    let fallback = ContainerKey::compose(container.endpoint_id, project, service);

    if claimed.contains(&fallback) {
        return Resolution::New(primary);
    }

    // The same instance still indexed under the compose key: steady state
    // after an earlier rename.
    if let Some(prev_c) = previous.container(&fallback) {
        if prev_c.raw_id == container.raw_id {
            return Resolution::Continuous(fallback);
        }
    }

    if contenders.get(&fallback).copied().unwrap_or(0) > 1 {
        debug!(
            container = %primary,
            fallback = %fallback,
            "multiple containers contend for the compose identity, treating as new"
        );
        return Resolution::New(primary);
    }

    // Sole contender, recreated while already holding the compose key.
    if previous.containers_by_name.contains_key(&fallback) {
        return Resolution::Continuous(fallback);
    }

    // First cycle after a rename: the labels must point at exactly one prior
    // entity, and that entity must be gone by name.
    let mut candidates = previous.containers_indexed().filter(|(_, prev_c)| {
        prev_c.endpoint_id == container.endpoint_id
            && prev_c.matches_compose(project, service)
            && !current_names.contains(&prev_c.primary_key())
    });
    match (candidates.next(), candidates.next()) {
        (Some((prev_key, _)), None) => Resolution::Renamed {
            key: fallback,
            previous: prev_key.clone(),
        },
        (Some(_), Some(_)) => {
            debug!(
                container = %primary,
                fallback = %fallback,
                "compose labels match several prior entities, treating as new"
            );
            Resolution::New(primary)
        }
        _ => Resolution::New(primary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerState;

    fn container(
        endpoint_id: i64,
        raw_id: &str,
        name: &str,
        project: Option<&str>,
        service: Option<&str>,
    ) -> Container {
        Container {
            raw_id: raw_id.into(),
            endpoint_id,
            name: name.into(),
            image: "nginx:latest".into(),
            state: ContainerState::Running,
            stack_id: None,
            compose_project: project.map(Into::into),
            compose_service: service.map(Into::into),
        }
    }

    fn snapshot_of(entries: Vec<(ContainerKey, Container)>) -> Snapshot {
        let mut snap = Snapshot::empty();
        for (key, c) in entries {
            snap.containers.push(c);
            snap.containers_by_name
                .insert(key, snap.containers.len() - 1);
        }
        snap
    }

    fn resolve_cycle(current: &[Container], previous: &Snapshot) -> Vec<Resolution> {
        let current_names: HashSet<ContainerKey> =
            current.iter().map(|c| c.primary_key()).collect();
        let contenders = fallback_contenders(current, previous);
        let mut claimed = HashSet::new();
        current
            .iter()
            .map(|c| {
                let r = resolve(c, previous, &current_names, &claimed, &contenders);
                claimed.insert(r.key().clone());
                r
            })
            .collect()
    }

    #[test]
    fn name_match_survives_recreation() {
        let old = container(1, "aaa", "web", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![(old.primary_key(), old)]);
        let recreated = container(1, "bbb", "web", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[recreated], &prev);
        assert_eq!(rs[0], Resolution::Continuous(ContainerKey::named(1, "web")));
    }

    #[test]
    fn first_cycle_everything_is_new() {
        let prev = Snapshot::empty();
        let c = container(1, "aaa", "web", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[c], &prev);
        assert_eq!(rs[0], Resolution::New(ContainerKey::named(1, "web")));
    }

    #[test]
    fn rename_adopts_compose_key() {
        let old = container(1, "aaa", "myapp-web-1", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![(old.primary_key(), old)]);
        let renamed = container(1, "bbb", "myapp_web_run2", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[renamed], &prev);
        assert_eq!(
            rs[0],
            Resolution::Renamed {
                key: ContainerKey::compose(1, "myapp", "web"),
                previous: ContainerKey::named(1, "myapp-web-1"),
            }
        );
    }

    #[test]
    fn compose_key_is_stable_on_later_cycles() {
        // After a rename the entity is indexed under the compose form.
        let renamed = container(1, "bbb", "myapp_web_run2", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![(ContainerKey::compose(1, "myapp", "web"), renamed.clone())]);
        let rs = resolve_cycle(&[renamed], &prev);
        assert_eq!(
            rs[0],
            Resolution::Continuous(ContainerKey::compose(1, "myapp", "web"))
        );
    }

    #[test]
    fn compose_key_survives_another_recreation() {
        let held = container(1, "bbb", "myapp_web_run2", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![(ContainerKey::compose(1, "myapp", "web"), held)]);
        let recreated = container(1, "ccc", "myapp_web_run3", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[recreated], &prev);
        assert_eq!(
            rs[0],
            Resolution::Continuous(ContainerKey::compose(1, "myapp", "web"))
        );
    }

    #[test]
    fn unlabeled_rename_becomes_new() {
        let old = container(1, "aaa", "web", None, None);
        let prev = snapshot_of(vec![(old.primary_key(), old)]);
        let renamed = container(1, "bbb", "web-new", None, None);
        let rs = resolve_cycle(&[renamed], &prev);
        assert_eq!(rs[0], Resolution::New(ContainerKey::named(1, "web-new")));
    }

    #[test]
    fn scaled_siblings_never_merge() {
        let one = container(1, "aaa", "myapp-web-1", Some("myapp"), Some("web"));
        let two = container(1, "bbb", "myapp-web-2", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![
            (one.primary_key(), one.clone()),
            (two.primary_key(), two.clone()),
        ]);
        // Both keep their names; both stay on name keys.
        let rs = resolve_cycle(&[one.clone(), two.clone()], &prev);
        assert_eq!(
            rs[0],
            Resolution::Continuous(ContainerKey::named(1, "myapp-web-1"))
        );
        assert_eq!(
            rs[1],
            Resolution::Continuous(ContainerKey::named(1, "myapp-web-2"))
        );
    }

    #[test]
    fn sibling_alive_by_name_is_not_a_rename_candidate() {
        let one = container(1, "aaa", "myapp-web-1", Some("myapp"), Some("web"));
        let two = container(1, "bbb", "myapp-web-2", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![
            (one.primary_key(), one.clone()),
            (two.primary_key(), two),
        ]);
        // Only web-2 was recreated under a new name; web-1 is untouched.
        let renamed_two = container(1, "ddd", "myapp_web_run9", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[one, renamed_two], &prev);
        assert_eq!(
            rs[0],
            Resolution::Continuous(ContainerKey::named(1, "myapp-web-1"))
        );
        assert_eq!(
            rs[1],
            Resolution::Renamed {
                key: ContainerKey::compose(1, "myapp", "web"),
                previous: ContainerKey::named(1, "myapp-web-2"),
            }
        );
    }

    #[test]
    fn two_renamed_siblings_are_ambiguous() {
        let one = container(1, "aaa", "myapp-web-1", Some("myapp"), Some("web"));
        let two = container(1, "bbb", "myapp-web-2", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![
            (one.primary_key(), one),
            (two.primary_key(), two),
        ]);
        let renamed_one = container(1, "ccc", "run-a", Some("myapp"), Some("web"));
        let renamed_two = container(1, "ddd", "run-b", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[renamed_one, renamed_two], &prev);
        assert_eq!(rs[0], Resolution::New(ContainerKey::named(1, "run-a")));
        assert_eq!(rs[1], Resolution::New(ContainerKey::named(1, "run-b")));
    }

    #[test]
    fn claimed_compose_key_forces_new() {
        let held = container(1, "bbb", "run-a", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![(ContainerKey::compose(1, "myapp", "web"), held.clone())]);
        // The steady-state holder resolves first and claims the compose key;
        // a scaled-up sibling cannot take it.
        let sibling = container(1, "ccc", "run-b", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[held, sibling], &prev);
        assert_eq!(
            rs[0],
            Resolution::Continuous(ContainerKey::compose(1, "myapp", "web"))
        );
        assert_eq!(rs[1], Resolution::New(ContainerKey::named(1, "run-b")));
    }

    #[test]
    fn endpoints_keep_identities_apart() {
        let old = container(1, "aaa", "myapp-web-1", Some("myapp"), Some("web"));
        let prev = snapshot_of(vec![(old.primary_key(), old)]);
        // Same labels on another endpoint are unrelated.
        let other = container(2, "bbb", "fresh-name", Some("myapp"), Some("web"));
        let rs = resolve_cycle(&[other], &prev);
        assert_eq!(rs[0], Resolution::New(ContainerKey::named(2, "fresh-name")));
    }
}

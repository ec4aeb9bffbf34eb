// Topology refresh worker: fetch, resolve identity, synthesize, publish.
// One worker per control plane; cycles are serialized by the single loop, so
// a refresh requested mid-cycle queues and coalesces with its neighbors.

mod identity;
mod synth;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::models::{Container, ContainerKey, KeyTransition, PartialData, Snapshot};
use crate::portainer_repo::{ApiError, ControlPlane};

/// Queued out-of-band refresh requests.
const REFRESH_QUEUE: usize = 16;

#[derive(Debug, thiserror::Error)]
enum RefreshError {
    #[error("endpoint listing failed: {0}")]
    Fetch(#[source] ApiError),
}

/// The topology worker has stopped; no further refreshes are possible.
#[derive(Debug, thiserror::Error)]
#[error("topology worker is not running")]
pub struct RefreshClosed;

/// Requests an out-of-band refresh. The await resolves once a cycle that
/// started at or after the request has finished; requests arriving while a
/// cycle runs are drained together and served by one cycle.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl RefreshHandle {
    pub async fn refresh(&self) -> Result<(), RefreshClosed> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx.send(done_tx).await.map_err(|_| RefreshClosed)?;
        done_rx.await.map_err(|_| RefreshClosed)
    }
}

pub fn refresh_channel() -> (RefreshHandle, mpsc::Receiver<oneshot::Sender<()>>) {
    let (tx, rx) = mpsc::channel(REFRESH_QUEUE);
    (RefreshHandle { tx }, rx)
}

pub struct TopologyDeps<C: ControlPlane> {
    pub api: Arc<C>,
    pub snapshot_tx: watch::Sender<Arc<Snapshot>>,
    pub refresh_rx: mpsc::Receiver<oneshot::Sender<()>>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct TopologyConfig {
    pub scan_interval: Duration,
    /// How often to log app stats (cycles, entity counts) at INFO level.
    pub stats_log_interval: Duration,
}

pub fn spawn<C: ControlPlane>(deps: TopologyDeps<C>, config: TopologyConfig) -> JoinHandle<()> {
    tokio::spawn(worker_loop(deps, config))
}

async fn worker_loop<C: ControlPlane>(deps: TopologyDeps<C>, config: TopologyConfig) {
    let TopologyDeps {
        api,
        snapshot_tx,
        mut refresh_rx,
        mut shutdown_rx,
    } = deps;

    let mut tick = interval(config.scan_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats_log_tick = interval(config.stats_log_interval);
    stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cycles_total: u64 = 0;
    let mut cycles_failed: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                run_and_publish(&*api, &snapshot_tx, &mut cycles_total, &mut cycles_failed).await;
            }
            requested = refresh_rx.recv() => {
                let Some(first) = requested else {
                    debug!("all refresh handles dropped");
                    break;
                };
                let mut acks = vec![first];
                while let Ok(extra) = refresh_rx.try_recv() {
                    acks.push(extra);
                }
                debug!(coalesced = acks.len(), "running requested refresh");
                run_and_publish(&*api, &snapshot_tx, &mut cycles_total, &mut cycles_failed).await;
                for ack in acks {
                    let _ = ack.send(());
                }
                // A forced refresh counts as a scan; push the next one out.
                tick.reset();
            }
            _ = &mut shutdown_rx => {
                debug!("topology worker shutting down");
                break;
            }
            _ = stats_log_tick.tick() => {
                let (endpoints, stacks, containers) = {
                    let snapshot = snapshot_tx.borrow();
                    (
                        snapshot.endpoints.len(),
                        snapshot.stacks.len(),
                        snapshot.containers_by_name.len(),
                    )
                };
                info!(
                    cycles_total,
                    cycles_failed,
                    endpoints,
                    stacks,
                    containers,
                    "topology stats"
                );
            }
        }
    }
}

async fn run_and_publish<C: ControlPlane>(
    api: &C,
    snapshot_tx: &watch::Sender<Arc<Snapshot>>,
    cycles_total: &mut u64,
    cycles_failed: &mut u64,
) {
    let previous = snapshot_tx.borrow().clone();
    match run_cycle(api, &previous).await {
        Ok(snapshot) => {
            *cycles_total += 1;
            if !snapshot.partial.is_empty() {
                debug!(
                    stacks_failed = ?snapshot.partial.stacks_failed,
                    containers_failed = ?snapshot.partial.containers_failed,
                    "cycle published with partial data"
                );
            }
            snapshot_tx.send_replace(Arc::new(snapshot));
        }
        Err(RefreshError::Fetch(e)) => {
            // The previous snapshot stays published unchanged; the next tick
            // is the retry.
            *cycles_failed += 1;
            warn!(
                error = %e,
                operation = "list_endpoints",
                "topology refresh failed, keeping previous snapshot"
            );
        }
    }
}

async fn run_cycle<C: ControlPlane>(
    api: &C,
    previous: &Snapshot,
) -> Result<Snapshot, RefreshError> {
    let endpoints = api.list_endpoints().await.map_err(RefreshError::Fetch)?;

    let mut partial = PartialData::default();
    let mut endpoint_map = BTreeMap::new();
    let mut stacks = BTreeMap::new();
    let mut containers: Vec<Container> = Vec::new();

    for endpoint in endpoints {
        let endpoint_id = endpoint.id;
        let up = endpoint.is_up();
        endpoint_map.insert(endpoint_id, endpoint);
        if !up {
            debug!(endpoint = endpoint_id, "endpoint down, skipping fetch");
            continue;
        }

        // Stack and container failures degrade to empty collections; the
        // rest of the cycle still publishes.
        let native = match api.list_stacks(endpoint_id).await {
            Ok(stacks) => stacks,
            Err(e) => {
                warn!(
                    error = %e,
                    endpoint = endpoint_id,
                    operation = "list_stacks",
                    "stack listing failed"
                );
                partial.stacks_failed.push(endpoint_id);
                Vec::new()
            }
        };
        let mut fetched = match api.list_containers(endpoint_id).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(
                    error = %e,
                    endpoint = endpoint_id,
                    operation = "list_containers",
                    "container listing failed"
                );
                partial.containers_failed.push(endpoint_id);
                Vec::new()
            }
        };

        stacks.extend(synth::assign_stacks(endpoint_id, native, &mut fetched));
        containers.append(&mut fetched);
    }

    // Deterministic resolution and claim order.
    containers.sort_by(|a, b| {
        (a.endpoint_id, a.name.as_str()).cmp(&(b.endpoint_id, b.name.as_str()))
    });

    let current_names: HashSet<ContainerKey> =
        containers.iter().map(|c| c.primary_key()).collect();
    let contenders = identity::fallback_contenders(&containers, previous);

    let mut index: BTreeMap<ContainerKey, usize> = BTreeMap::new();
    let mut claimed: HashSet<ContainerKey> = HashSet::new();
    let mut rekeyed: Vec<KeyTransition> = Vec::new();

    for (idx, container) in containers.iter().enumerate() {
        let resolution =
            identity::resolve(container, previous, &current_names, &claimed, &contenders);
        if let identity::Resolution::Renamed {
            key,
            previous: prev_key,
        } = &resolution
        {
            info!(
                previous = %prev_key,
                current = %key,
                "container adopted its compose identity key"
            );
            rekeyed.push(KeyTransition {
                previous: prev_key.clone(),
                current: key.clone(),
            });
        }
        let key = resolution.key().clone();
        claimed.insert(key.clone());
        index.insert(key, idx);
    }

    Ok(Snapshot {
        cycle: previous.cycle + 1,
        fetched_at: now_ms(),
        endpoints: endpoint_map,
        stacks,
        containers,
        containers_by_name: index,
        rekeyed,
        partial,
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

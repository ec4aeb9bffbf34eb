// Per-container stats pollers, reconciled against published snapshots.
// One poller task per logical container identity; readers share the latest
// published value, so each container is polled at most once per interval.

mod calc;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::models::{ContainerKey, ContainerStatsState, SmoothedStats, Snapshot, StatsSample};
use crate::portainer_repo::ControlPlane;

/// Consecutive failed polls before a container's stats are marked stale.
pub const STATS_FAILURE_THRESHOLD: u32 = 3;

/// Queued rekey notifications per poller.
const REKEY_QUEUE: usize = 4;

/// Latest published stats per container identity, shared read-only with
/// routes and diagnostics.
pub type SharedStats = Arc<RwLock<HashMap<ContainerKey, ContainerStatsState>>>;

pub struct StatsDeps<C: ControlPlane> {
    pub api: Arc<C>,
    pub snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    pub stats: SharedStats,
    pub shutdown_rx: oneshot::Receiver<()>,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsOptions {
    pub scan_interval: Duration,
    pub smoothing_alpha: f64,
    pub mem_exclude_cache: bool,
}

/// Spawns the manager task that keeps one poller per indexed container.
pub fn spawn<C: ControlPlane>(deps: StatsDeps<C>, options: StatsOptions) -> JoinHandle<()> {
    tokio::spawn(manager_loop(deps, options))
}

struct PollerHandle {
    handle: JoinHandle<()>,
    rekey_tx: mpsc::Sender<ContainerKey>,
}

async fn manager_loop<C: ControlPlane>(deps: StatsDeps<C>, options: StatsOptions) {
    let StatsDeps {
        api,
        mut snapshot_rx,
        stats,
        mut shutdown_rx,
    } = deps;

    let mut pollers: HashMap<ContainerKey, PollerHandle> = HashMap::new();

    // Catch up with whatever was published before this task started.
    let initial = snapshot_rx.borrow_and_update().clone();
    reconcile(&mut pollers, &initial, &api, &snapshot_rx, &stats, options).await;

    loop {
        tokio::select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                reconcile(&mut pollers, &snapshot, &api, &snapshot_rx, &stats, options).await;
            }
            _ = &mut shutdown_rx => break,
        }
    }

    for (_, poller) in pollers.drain() {
        poller.handle.abort();
    }
    debug!("stats manager shutting down");
}

async fn reconcile<C: ControlPlane>(
    pollers: &mut HashMap<ContainerKey, PollerHandle>,
    snapshot: &Arc<Snapshot>,
    api: &Arc<C>,
    snapshot_rx: &watch::Receiver<Arc<Snapshot>>,
    stats: &SharedStats,
    options: StatsOptions,
) {
    // Apply renames first so continuity survives the add/remove diff below.
    for transition in &snapshot.rekeyed {
        let Some(poller) = pollers.remove(&transition.previous) else {
            continue;
        };
        if poller.rekey_tx.try_send(transition.current.clone()).is_ok() {
            pollers.insert(transition.current.clone(), poller);
            debug!(
                previous = %transition.previous,
                current = %transition.current,
                "stats poller rekeyed"
            );
        } else {
            // Poller wedged on a hung poll; drop it and let the diff respawn
            // a fresh one under the new key.
            warn!(
                previous = %transition.previous,
                current = %transition.current,
                "rekey queue full, restarting poller"
            );
            poller.handle.abort();
            stats.write().await.remove(&transition.previous);
        }
    }

    let removed: Vec<ContainerKey> = pollers
        .keys()
        .filter(|key| !snapshot.containers_by_name.contains_key(*key))
        .cloned()
        .collect();
    for key in removed {
        if let Some(poller) = pollers.remove(&key) {
            poller.handle.abort();
        }
        stats.write().await.remove(&key);
        debug!(container = %key, "stats poller removed");
    }

    for key in snapshot.containers_by_name.keys() {
        if pollers.contains_key(key) {
            continue;
        }
        let (rekey_tx, rekey_rx) = mpsc::channel(REKEY_QUEUE);
        let poller = Poller {
            api: api.clone(),
            key: key.clone(),
            snapshot_rx: snapshot_rx.clone(),
            stats: stats.clone(),
            options,
            last_sample: None,
            last_cpu: None,
            failures: 0,
        };
        let handle = tokio::spawn(poller.run(rekey_rx));
        pollers.insert(key.clone(), PollerHandle { handle, rekey_tx });
        debug!(container = %key, "stats poller started");
    }
}

/// One per-container poll loop. Owns the previous raw sample and the previous
/// smoothed CPU value; nothing else holds smoothing state.
struct Poller<C: ControlPlane> {
    api: Arc<C>,
    key: ContainerKey,
    snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    stats: SharedStats,
    options: StatsOptions,
    last_sample: Option<StatsSample>,
    last_cpu: Option<f64>,
    failures: u32,
}

impl<C: ControlPlane> Poller<C> {
    async fn run(mut self, mut rekey_rx: mpsc::Receiver<ContainerKey>) {
        let mut tick = interval(self.options.scan_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => self.poll_once().await,
                rekeyed = rekey_rx.recv() => {
                    match rekeyed {
                        Some(new_key) => self.rekey(new_key).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self) {
        // The raw id is resolved through the latest snapshot on every poll;
        // it changes under the same key when the container is recreated.
        let location = self
            .snapshot_rx
            .borrow()
            .container_location(&self.key)
            .map(|(endpoint_id, raw_id)| (endpoint_id, raw_id.to_string()));
        let Some((endpoint_id, raw_id)) = location else {
            // Vanished from the index; the manager reaps this poller on the
            // next snapshot.
            self.record_failure().await;
            return;
        };

        match self.api.container_stats(endpoint_id, &raw_id).await {
            Ok(sample) => self.record_sample(sample).await,
            Err(e) => {
                debug!(error = %e, container = %self.key, "stats poll failed");
                self.record_failure().await;
            }
        }
    }

    async fn record_sample(&mut self, sample: StatsSample) {
        let raw_cpu = self
            .last_sample
            .as_ref()
            .and_then(|prev| calc::cpu_percent(prev, &sample));
        let cpu_percent = raw_cpu.map(|raw| calc::ewma(self.options.smoothing_alpha, raw, self.last_cpu));
        if cpu_percent.is_some() {
            self.last_cpu = cpu_percent;
        }

        let used = calc::memory_used_bytes(&sample, self.options.mem_exclude_cache);
        let state = ContainerStatsState {
            stats: SmoothedStats {
                cpu_percent,
                mem_used_mib: calc::to_mib(used),
                mem_percent: calc::memory_percent(&sample, used),
            },
            stale: false,
            consecutive_failures: 0,
            updated_at: sample.timestamp,
        };

        self.failures = 0;
        self.last_sample = Some(sample);
        self.stats.write().await.insert(self.key.clone(), state);
    }

    /// A failed poll keeps the previous value; past the threshold the entry
    /// is only flagged stale, never dropped.
    async fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        let mut map = self.stats.write().await;
        if let Some(state) = map.get_mut(&self.key) {
            state.consecutive_failures = self.failures;
            if self.failures >= STATS_FAILURE_THRESHOLD {
                state.stale = true;
            }
        }
    }

    async fn rekey(&mut self, new_key: ContainerKey) {
        let mut map = self.stats.write().await;
        if let Some(state) = map.remove(&self.key) {
            map.insert(new_key.clone(), state);
        }
        drop(map);
        debug!(previous = %self.key, current = %new_key, "poller moved to new identity key");
        self.key = new_key;
    }
}

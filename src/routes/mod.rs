// HTTP and WebSocket surface

mod http;
mod ws;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::control::ControlDispatcher;
use crate::models::Snapshot;
use crate::portainer_repo::ControlPlane;
use crate::stats_worker::SharedStats;

pub(crate) struct AppState<C: ControlPlane> {
    pub(crate) api: Arc<C>,
    pub(crate) snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    pub(crate) stats: SharedStats,
    pub(crate) control: Arc<ControlDispatcher<C>>,
    pub(crate) config: AppConfig,
}

// Manual Clone: C itself need not be Clone, only the Arc handles are.
impl<C: ControlPlane> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            snapshot_rx: self.snapshot_rx.clone(),
            stats: self.stats.clone(),
            control: self.control.clone(),
            config: self.config.clone(),
        }
    }
}

pub fn app<C: ControlPlane>(
    api: Arc<C>,
    snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    stats: SharedStats,
    control: Arc<ControlDispatcher<C>>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        api,
        snapshot_rx,
        stats,
        control,
        config,
    };
    Router::new()
        .route("/", get(|| async { "stackwatch: container topology monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/topology", get(http::topology_handler::<C>)) // GET /api/topology
        .route("/api/devices", get(http::devices_handler::<C>)) // GET /api/devices
        .route("/api/containers", get(http::containers_handler::<C>)) // GET /api/containers
        .route("/api/stacks", get(http::stacks_handler::<C>)) // GET /api/stacks
        .route("/api/containers/stats", get(http::container_stats_handler::<C>)) // GET /api/containers/stats?key=
        .route("/api/diagnostics", get(http::diagnostics_handler::<C>)) // GET /api/diagnostics
        .route("/api/containers/start", post(http::container_start_handler::<C>)) // POST /api/containers/start
        .route("/api/containers/stop", post(http::container_stop_handler::<C>)) // POST /api/containers/stop
        .route("/api/containers/restart", post(http::container_restart_handler::<C>)) // POST /api/containers/restart
        .route("/api/stacks/start", post(http::stack_start_handler::<C>)) // POST /api/stacks/start
        .route("/api/stacks/stop", post(http::stack_stop_handler::<C>)) // POST /api/stacks/stop
        .route("/ws/topology", get(ws::ws_topology::<C>)) // WS /ws/topology
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

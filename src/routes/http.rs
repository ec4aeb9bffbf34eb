// GET handlers and control POSTs

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::config::AppConfig;
use crate::control::ControlError;
use crate::device_ids;
use crate::models::{ContainerKey, ContainerState, EndpointId, StackCounts, StackId};
use crate::naming;
use crate::portainer_repo::{ContainerAction, ControlPlane, StackAction};
use crate::version::{NAME, VERSION};

const REDACTED: &str = "**REDACTED**";

/// GET /version reports the service name and version (from Cargo.toml at
/// build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/topology serves the latest published snapshot.
pub(super) async fn topology_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let snapshot = state.snapshot_rx.borrow().as_ref().clone();
    axum::Json(snapshot)
}

/// GET /api/devices serves the endpoint -> stack -> container hierarchy.
pub(super) async fn devices_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let snapshot = state.snapshot_rx.borrow().clone();
    axum::Json(device_ids::device_tree(&snapshot))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ContainerView {
    key: ContainerKey,
    label: String,
    name: String,
    image: String,
    state: ContainerState,
    endpoint_id: EndpointId,
    stack_id: Option<StackId>,
    device_id: String,
}

/// GET /api/containers lists indexed containers with their resolved labels.
pub(super) async fn containers_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let mode = state.config.naming.container_label_mode;
    let snapshot = state.snapshot_rx.borrow().clone();
    let views: Vec<ContainerView> = snapshot
        .containers_indexed()
        .map(|(key, c)| ContainerView {
            key: key.clone(),
            label: naming::entity_label(c, mode),
            name: c.name.clone(),
            image: c.image.clone(),
            state: c.state,
            endpoint_id: c.endpoint_id,
            stack_id: c.stack_id.clone(),
            device_id: device_ids::container_device_id(c),
        })
        .collect();
    axum::Json(views)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StackView {
    key: String,
    #[serde(flatten)]
    stack: crate::models::Stack,
    counts: StackCounts,
}

/// GET /api/stacks lists stacks with member container counts.
pub(super) async fn stacks_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let snapshot = state.snapshot_rx.borrow().clone();
    let views: Vec<StackView> = snapshot
        .stacks
        .iter()
        .map(|(key, stack)| StackView {
            key: key.to_string(),
            stack: stack.clone(),
            counts: snapshot.stack_counts(stack),
        })
        .collect();
    axum::Json(views)
}

#[derive(Debug, Deserialize)]
pub(super) struct StatsQuery {
    key: String,
}

/// GET /api/containers/stats?key= serves the latest stats for one container
/// identity.
pub(super) async fn container_stats_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
    Query(query): Query<StatsQuery>,
) -> Response {
    let key = ContainerKey::from(query.key);
    match state.stats.read().await.get(&key) {
        Some(entry) => axum::Json(*entry).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /api/diagnostics reports redacted config plus a cycle and stats
/// summary.
pub(super) async fn diagnostics_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let (cycle, fetched_at, endpoints, stacks, containers, rekeyed, partial) = {
        let snapshot = state.snapshot_rx.borrow();
        (
            snapshot.cycle,
            snapshot.fetched_at,
            snapshot.endpoints.len(),
            snapshot.stacks.len(),
            snapshot.containers_by_name.len(),
            snapshot.rekeyed.clone(),
            snapshot.partial.clone(),
        )
    };
    let stats_tracked = state.stats.read().await.len();
    axum::Json(serde_json::json!({
        "connected": state.api.connected(),
        "cycle": cycle,
        "fetchedAt": fetched_at,
        "endpoints": endpoints,
        "stacks": stacks,
        "containers": containers,
        "rekeyed": rekeyed,
        "partial": partial,
        "statsTracked": stats_tracked,
        "config": redacted_config(&state.config),
    }))
}

fn redacted_config(config: &AppConfig) -> serde_json::Value {
    serde_json::json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port,
        },
        "portainer": {
            "url": config.portainer.url,
            "apiKey": REDACTED,
            "verifyTls": config.portainer.verify_tls,
            "timeoutSecs": config.portainer.timeout_secs,
        },
        "monitoring": {
            "scanIntervalSecs": config.monitoring.scan_interval_secs,
            "statsLogIntervalSecs": config.monitoring.stats_log_interval_secs,
        },
        "stats": {
            "scanIntervalSecs": config.stats.scan_interval_secs,
            "smoothingAlpha": config.stats.smoothing_alpha,
            "memExcludeCache": config.stats.mem_exclude_cache,
        },
        "naming": {
            "containerLabelMode": config.naming.container_label_mode,
        },
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct KeyBody {
    key: String,
}

pub(super) async fn container_start_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
    axum::Json(body): axum::Json<KeyBody>,
) -> Response {
    dispatch_container(state, body, ContainerAction::Start).await
}

pub(super) async fn container_stop_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
    axum::Json(body): axum::Json<KeyBody>,
) -> Response {
    dispatch_container(state, body, ContainerAction::Stop).await
}

pub(super) async fn container_restart_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
    axum::Json(body): axum::Json<KeyBody>,
) -> Response {
    dispatch_container(state, body, ContainerAction::Restart).await
}

async fn dispatch_container<C: ControlPlane>(
    state: AppState<C>,
    body: KeyBody,
    action: ContainerAction,
) -> Response {
    let key = ContainerKey::from(body.key);
    match state.control.container_action(&key, action).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => control_error_response(e),
    }
}

pub(super) async fn stack_start_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
    axum::Json(body): axum::Json<KeyBody>,
) -> Response {
    dispatch_stack(state, body, StackAction::Start).await
}

pub(super) async fn stack_stop_handler<C: ControlPlane>(
    State(state): State<AppState<C>>,
    axum::Json(body): axum::Json<KeyBody>,
) -> Response {
    dispatch_stack(state, body, StackAction::Stop).await
}

async fn dispatch_stack<C: ControlPlane>(
    state: AppState<C>,
    body: KeyBody,
    action: StackAction,
) -> Response {
    let key = crate::models::StackKey::from(body.key);
    match state.control.stack_action(&key, action).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => control_error_response(e),
    }
}

fn control_error_response(e: ControlError) -> Response {
    let status = match &e {
        ControlError::UnknownContainer(_) | ControlError::UnknownStack(_) => StatusCode::NOT_FOUND,
        ControlError::SyntheticStack(_) => StatusCode::CONFLICT,
        ControlError::Api(_) => StatusCode::BAD_GATEWAY,
        ControlError::Refresh(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        axum::Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

// WebSocket topology stream

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::Snapshot;
use crate::portainer_repo::ControlPlane;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded send; a timeout counts as a dead client, same as a send error.
async fn send_or_drop(socket: &mut WebSocket, message: Message) -> bool {
    let r = timeout(WS_SEND_TIMEOUT, socket.send(message)).await;
    !(r.is_err() || r.unwrap_or(Ok(())).is_err())
}

pub(super) async fn ws_topology<C: ControlPlane>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let rx = state.snapshot_rx.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_topology(socket, rx).await {
            tracing::info!("Topology stream error: {}", e);
        }
    })
}

/// Sends the current snapshot on connect, then one message per published
/// cycle. A slow client sees the latest snapshot, not every intermediate one.
async fn stream_topology(
    mut socket: WebSocket,
    mut rx: watch::Receiver<Arc<Snapshot>>,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to topology stream");

    let initial = rx.borrow_and_update().as_ref().clone();
    let json = serde_json::to_string(&initial)?;
    if !send_or_drop(&mut socket, Message::Text(json.into())).await {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().as_ref().clone();
                let json = serde_json::to_string(&snapshot)?;
                if !send_or_drop(&mut socket, Message::Text(json.into())).await {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !send_or_drop(&mut socket, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

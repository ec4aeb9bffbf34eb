// Control dispatch: resolve a key through the latest snapshot, act, settle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{ContainerKey, Snapshot, StackId, StackKey};
use crate::portainer_repo::{ApiError, ContainerAction, ControlPlane, StackAction};
use crate::topology_worker::{RefreshClosed, RefreshHandle};

/// Pause between the two post-action refreshes. Control-plane recreation is
/// asynchronous relative to the call's acknowledgement; the second refresh
/// picks up the settled state.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("no container known under key {0}")]
    UnknownContainer(ContainerKey),
    #[error("no stack known under key {0}")]
    UnknownStack(StackKey),
    #[error("stack {0} is synthesized from labels and cannot be controlled")]
    SyntheticStack(StackKey),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Refresh(#[from] RefreshClosed),
}

/// Issues lifecycle actions against the control plane. Raw ids are resolved
/// through the latest snapshot at dispatch time, never cached, because every
/// action may invalidate them.
pub struct ControlDispatcher<C: ControlPlane> {
    api: Arc<C>,
    snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    refresh: RefreshHandle,
    settle_delay: Duration,
}

impl<C: ControlPlane> ControlDispatcher<C> {
    pub fn new(
        api: Arc<C>,
        snapshot_rx: watch::Receiver<Arc<Snapshot>>,
        refresh: RefreshHandle,
    ) -> Self {
        Self {
            api,
            snapshot_rx,
            refresh,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Shorten the settle pause, for tests.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub async fn container_action(
        &self,
        key: &ContainerKey,
        action: ContainerAction,
    ) -> Result<(), ControlError> {
        let (endpoint_id, raw_id) = {
            let snapshot = self.snapshot_rx.borrow();
            let (endpoint_id, raw_id) = snapshot
                .container_location(key)
                .ok_or_else(|| ControlError::UnknownContainer(key.clone()))?;
            (endpoint_id, raw_id.to_string())
        };

        info!(container = %key, action = action.as_str(), "dispatching container action");
        self.api
            .container_action(endpoint_id, &raw_id, action)
            .await?;
        self.settle().await?;
        Ok(())
    }

    pub async fn stack_action(
        &self,
        key: &StackKey,
        action: StackAction,
    ) -> Result<(), ControlError> {
        let (endpoint_id, stack_id) = {
            let snapshot = self.snapshot_rx.borrow();
            let stack = snapshot
                .stack(key)
                .ok_or_else(|| ControlError::UnknownStack(key.clone()))?;
            match &stack.id {
                StackId::Native(id) => (stack.endpoint_id, *id),
                StackId::Synthetic(_) => {
                    return Err(ControlError::SyntheticStack(key.clone()));
                }
            }
        };

        info!(stack = %key, action = action.as_str(), "dispatching stack action");
        self.api.stack_action(endpoint_id, stack_id, action).await?;
        self.settle().await?;
        Ok(())
    }

    /// Two consecutive refreshes: the first catches the immediate effect, the
    /// second (after the settle pause) whatever the control plane recreated.
    async fn settle(&self) -> Result<(), RefreshClosed> {
        self.refresh.refresh().await?;
        debug!(delay_ms = self.settle_delay.as_millis() as u64, "awaiting settle");
        tokio::time::sleep(self.settle_delay).await;
        self.refresh.refresh().await
    }
}

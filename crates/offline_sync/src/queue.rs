//! The offline write path.
//!
//! [`OfflineQueue`] turns a user mutation into either an immediate remote
//! write or a durable pending action. Once `save_for_offline_sync` returns
//! `Ok`, the action is on disk and will be replayed by the reconciliation
//! runner.
//!
//! If the local store could not be opened the queue runs in degraded mode:
//! nothing is queued and every submission goes straight to the remote
//! service, failing visibly when that is unreachable.

use crate::action::OfflineAction;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::handlers::{self, WriteContext};
use crate::remote::{AuthProvider, RemoteService};
use local_store::{ActionId, FailedAction, LocalStore, StoreError};
use std::sync::Arc;

/// What happened to a submitted action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Written to the remote service; carries the new record id for creates
    Delivered { record_id: Option<String> },
    /// Persisted locally for later replay
    Queued(ActionId),
}

impl SubmitOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SubmitOutcome::Queued(_))
    }
}

/// Offline action queue
pub struct OfflineQueue<S, R, A> {
    store: Arc<S>,
    remote: Arc<R>,
    auth: Arc<A>,
    monitor: ConnectivityMonitor,
    /// Whether the store opened; `false` means degraded mode
    available: bool,
}

impl<S, R, A> OfflineQueue<S, R, A>
where
    S: LocalStore,
    R: RemoteService,
    A: AuthProvider,
{
    /// Open the store and build the queue.
    ///
    /// A store that refuses to open puts the queue in degraded mode instead
    /// of failing.
    pub async fn open(
        store: Arc<S>,
        remote: Arc<R>,
        auth: Arc<A>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let available = match store.initialize().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Offline support disabled, local store unavailable: {}", e);
                false
            }
        };

        Self {
            store,
            remote,
            auth,
            monitor,
            available,
        }
    }

    /// Whether actions can be queued
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist an action for later replay. Makes no remote call.
    pub async fn save_for_offline_sync(&self, action: &OfflineAction) -> SyncResult<ActionId> {
        if !self.available {
            return Err(SyncError::QueueUnavailable(
                "local store is not available".to_string(),
            ));
        }
        action.validate()?;

        let mut entry = action.to_new_pending()?;
        if let Some(user) = self.auth.current_user().await {
            entry = entry.with_user(user.user_id);
        }

        match self.store.enqueue_pending_action(entry).await {
            Ok(id) => {
                tracing::debug!("Queued {} action {}", action.kind(), id);
                Ok(id)
            }
            Err(e) => {
                tracing::error!("Failed to queue {} action: {}", action.kind(), e);
                Err(SyncError::QueueUnavailable(e.to_string()))
            }
        }
    }

    /// Submit a user mutation.
    ///
    /// Online, the action is written directly; a network failure falls back
    /// to the queue. Offline, it is queued. Errors are returned to the
    /// caller, never dropped.
    pub async fn submit(&self, action: OfflineAction) -> SyncResult<SubmitOutcome> {
        action.validate()?;

        if !self.available {
            return self.deliver(&action).await;
        }

        if self.monitor.is_online() {
            match self.deliver(&action).await {
                Err(SyncError::Remote(e)) if e.is_network() => {
                    tracing::warn!(
                        "Direct {} write failed ({}), queueing instead",
                        action.kind(),
                        e
                    );
                }
                other => return other,
            }
        }

        let id = self.save_for_offline_sync(&action).await?;
        Ok(SubmitOutcome::Queued(id))
    }

    async fn deliver(&self, action: &OfflineAction) -> SyncResult<SubmitOutcome> {
        let user_id = self.auth.current_user().await.map(|user| user.user_id);
        let record_id =
            handlers::apply(self.remote.as_ref(), action, &WriteContext::direct(user_id)).await?;
        Ok(SubmitOutcome::Delivered { record_id })
    }

    /// Number of actions waiting for replay; zero in degraded mode
    pub async fn pending_count(&self) -> SyncResult<usize> {
        if !self.available {
            return Ok(0);
        }
        Ok(self.store.list_pending_actions().await?.len())
    }

    /// Actions that exhausted their replay attempts
    pub async fn failed_actions(&self) -> SyncResult<Vec<FailedAction>> {
        if !self.available {
            return Ok(Vec::new());
        }
        Ok(self.store.list_failed_actions().await?)
    }

    /// Put a dead-lettered action back at the end of the queue.
    ///
    /// The action gets a new id, so it replays after everything queued
    /// since it failed.
    pub async fn requeue_failed(&self, id: ActionId) -> SyncResult<ActionId> {
        let failed = self
            .failed_actions()
            .await?
            .into_iter()
            .find(|failed| failed.action.id == id)
            .ok_or(SyncError::Store(StoreError::NotFound(id)))?;

        let original = failed.action;
        let mut entry = local_store::NewPendingAction::new(original.action_type, original.payload)
            .at(original.enqueued_at);
        if let Some(user_id) = original.user_id {
            entry = entry.with_user(user_id);
        }

        let new_id = self
            .store
            .enqueue_pending_action(entry)
            .await
            .map_err(|e| SyncError::QueueUnavailable(e.to_string()))?;
        self.store.remove_failed_action(id).await?;
        tracing::info!("Requeued failed action {} as {}", id, new_id);
        Ok(new_id)
    }

    /// Drop a dead-lettered action for good
    pub async fn discard_failed(&self, id: ActionId) -> SyncResult<()> {
        if !self.available {
            return Ok(());
        }
        self.store.remove_failed_action(id).await?;
        Ok(())
    }
}

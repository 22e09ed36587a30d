//! Reconciliation of queued actions.
//!
//! A pass replays every pending action in insertion order. Each action is
//! removed as soon as its remote write succeeds, so an interrupted pass never
//! replays finished work twice except for the one action in flight when it
//! stopped. A failing action is left in place and the pass moves on; after
//! `max_attempts` failed passes it is moved to the failed-actions list.
//!
//! A network failure says nothing about the action itself, so it leaves the
//! action queued without counting an attempt.
//!
//! Only one tab reconciles at a time: a pass first takes the `reconcile`
//! lease in the local store and skips entirely if another owner holds it.
//! The lease is renewed before every action; a pass that loses it stops.

use crate::action::OfflineAction;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::handlers::{self, WriteContext};
use crate::remote::{AuthProvider, RemoteService};
use chrono::Utc;
use local_store::{ActionId, CacheCollection, LocalStore, PendingAction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the cross-tab reconciliation lease
pub const RECONCILE_LEASE: &str = "reconcile";

/// Outcome of one reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Replayed and removed, in replay order
    pub replayed: Vec<ActionId>,
    /// Failed this pass, still queued
    pub failed: Vec<ActionId>,
    /// Remote unreachable, still queued; no attempt counted
    pub unreachable: Vec<ActionId>,
    /// Failed for the last allowed time, moved to the failed-actions list
    pub dead_lettered: Vec<ActionId>,
    /// Unknown type tag, left untouched
    pub unrecognized: Vec<ActionId>,
    /// Another tab was reconciling
    pub skipped_lease_held: bool,
    /// The lease expired mid-pass and another tab took it; the pass stopped
    pub lease_lost: bool,
    pub cache_refreshed: bool,
    pub cache_refresh_error: Option<String>,
    /// Local store failure that cut the pass short
    pub store_error: Option<String>,
}

impl ReconcileReport {
    /// Nothing was attempted
    pub fn is_idle(&self) -> bool {
        self.replayed.is_empty()
            && self.failed.is_empty()
            && self.unreachable.is_empty()
            && self.dead_lettered.is_empty()
            && self.unrecognized.is_empty()
    }

    /// Actions still queued after the pass
    pub fn remaining(&self) -> usize {
        self.failed.len() + self.unreachable.len() + self.unrecognized.len()
    }

    /// Some actions only failed because the remote could not be reached
    pub fn should_retry(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

/// Settings of a reconciliation runner
#[derive(Clone, Debug)]
pub struct ReconcileOptions {
    /// Lease owner; unique per runner
    pub owner_id: String,
    pub max_attempts: u32,
    pub lease_ttl: chrono::Duration,
    pub refresh_cache: bool,
}

impl ReconcileOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            owner_id: uuid::Uuid::new_v4().to_string(),
            max_attempts: config.max_attempts.max(1),
            lease_ttl: config.lease_ttl(),
            refresh_cache: config.refresh_cache,
        }
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

enum ReplayResult {
    Replayed,
    Failed(SyncError),
    Unreachable(SyncError),
    Unrecognized(String),
}

/// Replays the offline queue against the remote service
pub struct ReconciliationRunner<S, R, A> {
    store: Arc<S>,
    remote: Arc<R>,
    auth: Arc<A>,
    options: ReconcileOptions,
}

impl<S, R, A> ReconciliationRunner<S, R, A>
where
    S: LocalStore,
    R: RemoteService,
    A: AuthProvider,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, auth: Arc<A>, options: ReconcileOptions) -> Self {
        Self {
            store,
            remote,
            auth,
            options,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.options.owner_id
    }

    /// Run one reconciliation pass. Never fails; problems end up in the report.
    pub async fn run(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let owner = self.options.owner_id.as_str();

        match self.renew_lease().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Reconciliation already running in another tab");
                report.skipped_lease_held = true;
                return report;
            }
            Err(e) => {
                tracing::warn!("Could not take reconciliation lease: {}", e);
                report.store_error = Some(e.to_string());
                return report;
            }
        }

        self.replay_all(&mut report).await;

        if !report.is_idle() && !report.lease_lost && self.options.refresh_cache {
            self.refresh_cache(&mut report).await;
        }

        if let Err(e) = self.store.release_lease(RECONCILE_LEASE, owner).await {
            tracing::warn!("Could not release reconciliation lease: {}", e);
        }

        if !report.is_idle() {
            tracing::info!(
                "Reconciliation finished: {} replayed, {} failed, {} unreachable, {} dead-lettered, {} unrecognized",
                report.replayed.len(),
                report.failed.len(),
                report.unreachable.len(),
                report.dead_lettered.len(),
                report.unrecognized.len()
            );
        }
        report
    }

    /// Take or extend the lease for this runner
    async fn renew_lease(&self) -> local_store::StoreResult<bool> {
        self.store
            .try_acquire_lease(
                RECONCILE_LEASE,
                &self.options.owner_id,
                self.options.lease_ttl,
                Utc::now(),
            )
            .await
    }

    async fn replay_all(&self, report: &mut ReconcileReport) {
        let pending = match self.store.list_pending_actions().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("Could not list pending actions: {}", e);
                report.store_error = Some(e.to_string());
                return;
            }
        };

        if pending.is_empty() {
            return;
        }
        tracing::info!("Replaying {} queued actions", pending.len());

        for (index, action) in pending.iter().enumerate() {
            if index > 0 {
                match self.renew_lease().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            "Reconciliation lease taken over by another tab, stopping before action {}",
                            action.id
                        );
                        report.lease_lost = true;
                        return;
                    }
                    Err(e) => {
                        tracing::error!("Could not renew reconciliation lease: {}", e);
                        report.store_error = Some(e.to_string());
                        return;
                    }
                }
            }

            match self.replay_one(action).await {
                ReplayResult::Replayed => {
                    if let Err(e) = self.store.remove_pending_action(action.id).await {
                        // The write went through; the entry will be replayed again
                        tracing::error!("Replayed action {} could not be removed: {}", action.id, e);
                        report.store_error = Some(e.to_string());
                    }
                    report.replayed.push(action.id);
                }
                ReplayResult::Unrecognized(tag) => {
                    tracing::warn!("Skipping action {} with unknown type '{}'", action.id, tag);
                    report.unrecognized.push(action.id);
                }
                ReplayResult::Unreachable(err) => {
                    tracing::warn!("{}", err);
                    report.unreachable.push(action.id);
                }
                ReplayResult::Failed(err) => self.record_failure(action, err, report).await,
            }
        }
    }

    async fn replay_one(&self, pending: &PendingAction) -> ReplayResult {
        let action = match OfflineAction::from_pending(pending) {
            Ok(action) => action,
            Err(SyncError::UnrecognizedActionType(tag)) => return ReplayResult::Unrecognized(tag),
            Err(e) => return ReplayResult::Failed(e),
        };

        match handlers::apply(self.remote.as_ref(), &action, &WriteContext::replay(pending)).await {
            Ok(_) => ReplayResult::Replayed,
            Err(e) => {
                let err = SyncError::ReplayHandlerFailure {
                    id: pending.id,
                    reason: e.to_string(),
                };
                if e.is_network() {
                    ReplayResult::Unreachable(err)
                } else {
                    ReplayResult::Failed(err)
                }
            }
        }
    }

    async fn record_failure(
        &self,
        action: &PendingAction,
        err: SyncError,
        report: &mut ReconcileReport,
    ) {
        tracing::warn!("{}", err);

        let attempts = match self.store.record_replay_failure(action.id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::error!("Could not record failure of action {}: {}", action.id, e);
                report.failed.push(action.id);
                return;
            }
        };

        if attempts < self.options.max_attempts {
            report.failed.push(action.id);
            return;
        }

        match self.store.move_to_failed(action.id, &err.to_string()).await {
            Ok(_) => {
                tracing::warn!(
                    "Action {} failed {} times, moved to failed actions",
                    action.id,
                    attempts
                );
                report.dead_lettered.push(action.id);
            }
            Err(e) => {
                tracing::error!("Could not move action {} to failed actions: {}", action.id, e);
                report.failed.push(action.id);
            }
        }
    }

    /// Refresh the profile and settings caches. Failures are only reported.
    async fn refresh_cache(&self, report: &mut ReconcileReport) {
        let Some(user) = self.auth.current_user().await else {
            return;
        };

        match self.fetch_and_cache(&user.user_id).await {
            Ok(()) => report.cache_refreshed = true,
            Err(e) => {
                tracing::warn!("Cache refresh after reconciliation failed: {}", e);
                report.cache_refresh_error = Some(e.to_string());
            }
        }
    }

    async fn fetch_and_cache(&self, user_id: &str) -> Result<(), SyncError> {
        let profile = self.remote.fetch_user_profile(user_id).await?;
        self.store
            .set_cached_value(CacheCollection::UserCache, user_id, profile)
            .await?;

        let settings = self.remote.fetch_settings(user_id).await?;
        self.store
            .set_cached_value(CacheCollection::SettingsCache, user_id, settings)
            .await?;
        Ok(())
    }
}

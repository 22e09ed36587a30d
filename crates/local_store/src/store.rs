//! Local store abstraction.
//!
//! This module defines the `LocalStore` trait: a per-origin store holding the
//! replay ledger of pending actions alongside best-effort caches of remote
//! state. Implementations serialize their own transactions, so every method
//! takes `&self`.

use crate::error::StoreResult;
use crate::record::{
    ActionId, CacheCollection, CachedMessage, FailedAction, NewPendingAction, PendingAction,
    StoreStats,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Trait for durable local store backends
///
/// # Contract
///
/// - Every call made before a successful [`initialize`](LocalStore::initialize)
///   fails with `StoreError::StorageUnavailable`.
/// - Pending actions are listed in insertion order. Replay order depends on it.
/// - A pending action is only ever inserted or deleted. Replay bookkeeping
///   (attempt counts) is kept in a separate ledger.
/// - Cached values are last-write-wins with no expiry.
///
/// # Example
///
/// ```ignore
/// use local_store::{LocalStore, MemoryLocalStore, NewPendingAction};
///
/// let store = MemoryLocalStore::new();
/// store.initialize().await?;
/// let id = store
///     .enqueue_pending_action(NewPendingAction::new("sendMessage", payload))
///     .await?;
/// ```
#[trait_variant::make(Send)]
pub trait LocalStore: Send + Sync {
    /// Open every collection, creating them on first use.
    async fn initialize(&self) -> StoreResult<()>;

    /// Insert a pending action and return its assigned id.
    async fn enqueue_pending_action(&self, action: NewPendingAction) -> StoreResult<ActionId>;

    /// All pending actions, oldest first.
    async fn list_pending_actions(&self) -> StoreResult<Vec<PendingAction>>;

    /// Delete a pending action and its attempt count. Removing an unknown id is not an error.
    async fn remove_pending_action(&self, id: ActionId) -> StoreResult<()>;

    async fn get_cached_value(
        &self,
        collection: CacheCollection,
        key: &str,
    ) -> StoreResult<Option<Value>>;

    async fn set_cached_value(
        &self,
        collection: CacheCollection,
        key: &str,
        value: Value,
    ) -> StoreResult<()>;

    /// Cache messages for a chat, replacing any with the same message id.
    async fn cache_messages(&self, chat_id: &str, messages: Vec<CachedMessage>)
        -> StoreResult<()>;

    /// Cached messages for a chat, ordered by timestamp.
    async fn cached_messages(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>>;

    /// Count one more failed replay of `id` and return the new total.
    async fn record_replay_failure(&self, id: ActionId) -> StoreResult<u32>;

    /// Failed replays recorded for `id` so far.
    async fn replay_attempts(&self, id: ActionId) -> StoreResult<u32>;

    /// Move a pending action to the failed-actions collection.
    ///
    /// Fails with `StoreError::NotFound` if the action is not pending.
    async fn move_to_failed(&self, id: ActionId, last_error: &str) -> StoreResult<FailedAction>;

    /// Dead-lettered actions, oldest first.
    async fn list_failed_actions(&self) -> StoreResult<Vec<FailedAction>>;

    /// Delete a dead-lettered action. Idempotent.
    async fn remove_failed_action(&self, id: ActionId) -> StoreResult<()>;

    /// Take the named lease for `owner` until `now + ttl`.
    ///
    /// Succeeds when the lease is free, expired, or already held by `owner`
    /// (which renews it). Returns `false` when another owner holds a live lease.
    async fn try_acquire_lease(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Release the named lease if `owner` holds it.
    async fn release_lease(&self, name: &str, owner: &str) -> StoreResult<()>;

    /// Wipe every collection. Only for explicit logout or reset.
    async fn clear_all(&self) -> StoreResult<()>;

    /// Counts per collection.
    async fn stats(&self) -> StoreResult<StoreStats>;
}

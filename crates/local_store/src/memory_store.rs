//! In-memory local store implementation.
//!
//! `MemoryLocalStore` keeps every collection in memory behind a single
//! `RwLock`. Nothing survives a restart, which makes it the backend for tests
//! and for sessions where persistent storage was refused.
//!
//! Two knobs simulate browser storage failures:
//! - [`MemoryLocalStore::unavailable`] builds a store whose `initialize` fails
//!   (private browsing, storage disabled).
//! - [`MemoryLocalStore::with_pending_quota`] caps the pending-action count so
//!   an enqueue can fail mid-session (quota exhaustion).

use crate::error::{StoreError, StoreResult};
use crate::record::{
    merge_messages, ActionId, CacheCollection, CachedMessage, FailedAction, NewPendingAction,
    PendingAction, StoreStats, SyncLease,
};
use crate::store::LocalStore;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Every collection of one origin
#[derive(Default)]
struct Collections {
    next_id: u64,
    pending: BTreeMap<ActionId, PendingAction>,
    attempts: HashMap<ActionId, u32>,
    failed: BTreeMap<ActionId, FailedAction>,
    messages: HashMap<String, Vec<CachedMessage>>,
    user_cache: HashMap<String, Value>,
    settings_cache: HashMap<String, Value>,
    locks: HashMap<String, SyncLease>,
}

impl Collections {
    fn cache(&self, collection: CacheCollection) -> &HashMap<String, Value> {
        match collection {
            CacheCollection::UserCache => &self.user_cache,
            CacheCollection::SettingsCache => &self.settings_cache,
        }
    }

    fn cache_mut(&mut self, collection: CacheCollection) -> &mut HashMap<String, Value> {
        match collection {
            CacheCollection::UserCache => &mut self.user_cache,
            CacheCollection::SettingsCache => &mut self.settings_cache,
        }
    }
}

/// In-memory implementation of `LocalStore`
pub struct MemoryLocalStore {
    /// `None` until `initialize` succeeds
    state: RwLock<Option<Collections>>,
    /// Reason `initialize` is refused, if any
    unavailable: Option<String>,
    /// Maximum number of pending actions
    pending_quota: Option<usize>,
}

impl MemoryLocalStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            unavailable: None,
            pending_quota: None,
        }
    }

    /// Create a store that refuses to open
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::new()
        }
    }

    /// Create a store that accepts at most `quota` pending actions
    pub fn with_pending_quota(quota: usize) -> Self {
        Self {
            pending_quota: Some(quota),
            ..Self::new()
        }
    }

    fn not_initialized() -> StoreError {
        StoreError::StorageUnavailable("store not initialized".to_string())
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryLocalStore {
    async fn initialize(&self) -> StoreResult<()> {
        if let Some(reason) = &self.unavailable {
            return Err(StoreError::StorageUnavailable(reason.clone()));
        }

        let mut state = self.state.write().await;
        if state.is_none() {
            *state = Some(Collections::default());
            tracing::debug!("In-memory local store opened");
        }
        Ok(())
    }

    async fn enqueue_pending_action(&self, action: NewPendingAction) -> StoreResult<ActionId> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;

        if let Some(quota) = self.pending_quota {
            if state.pending.len() >= quota {
                return Err(StoreError::QuotaExceeded);
            }
        }

        state.next_id += 1;
        let id = ActionId(state.next_id);
        state.pending.insert(id, action.into_pending(id));
        Ok(id)
    }

    async fn list_pending_actions(&self) -> StoreResult<Vec<PendingAction>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.pending.values().cloned().collect())
    }

    async fn remove_pending_action(&self, id: ActionId) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        state.pending.remove(&id);
        state.attempts.remove(&id);
        Ok(())
    }

    async fn get_cached_value(
        &self,
        collection: CacheCollection,
        key: &str,
    ) -> StoreResult<Option<Value>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.cache(collection).get(key).cloned())
    }

    async fn set_cached_value(
        &self,
        collection: CacheCollection,
        key: &str,
        value: Value,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        state.cache_mut(collection).insert(key.to_string(), value);
        Ok(())
    }

    async fn cache_messages(
        &self,
        chat_id: &str,
        messages: Vec<CachedMessage>,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        let cached = state.messages.entry(chat_id.to_string()).or_default();
        merge_messages(cached, messages);
        Ok(())
    }

    async fn cached_messages(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.messages.get(chat_id).cloned().unwrap_or_default())
    }

    async fn record_replay_failure(&self, id: ActionId) -> StoreResult<u32> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        if !state.pending.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let attempts = state.attempts.entry(id).or_insert(0);
        *attempts += 1;
        Ok(*attempts)
    }

    async fn replay_attempts(&self, id: ActionId) -> StoreResult<u32> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.attempts.get(&id).copied().unwrap_or(0))
    }

    async fn move_to_failed(&self, id: ActionId, last_error: &str) -> StoreResult<FailedAction> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;

        let action = state.pending.remove(&id).ok_or(StoreError::NotFound(id))?;
        let attempts = state.attempts.remove(&id).unwrap_or(0);
        let failed = FailedAction {
            action,
            attempts,
            last_error: last_error.to_string(),
            failed_at: Utc::now(),
        };
        state.failed.insert(id, failed.clone());
        Ok(failed)
    }

    async fn list_failed_actions(&self) -> StoreResult<Vec<FailedAction>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(state.failed.values().cloned().collect())
    }

    async fn remove_failed_action(&self, id: ActionId) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        state.failed.remove(&id);
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;

        if let Some(existing) = state.locks.get(name) {
            if !existing.can_be_acquired_by(owner, now) {
                return Ok(false);
            }
        }

        state.locks.insert(
            name.to_string(),
            SyncLease {
                name: name.to_string(),
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, name: &str, owner: &str) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        if state.locks.get(name).is_some_and(|lease| lease.owner == owner) {
            state.locks.remove(name);
        }
        Ok(())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(Self::not_initialized)?;
        let next_id = state.next_id;
        *state = Collections {
            next_id,
            ..Collections::default()
        };
        tracing::info!("In-memory local store cleared");
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(Self::not_initialized)?;
        Ok(StoreStats {
            pending_actions: state.pending.len(),
            failed_actions: state.failed.len(),
            cached_chats: state.messages.len(),
            cached_messages: state.messages.values().map(Vec::len).sum(),
            cached_values: state.user_cache.len() + state.settings_cache.len(),
        })
    }
}

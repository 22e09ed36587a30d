//! Records persisted in the local store.
//!
//! Pending actions are opaque to the store: the action type is a plain tag and
//! the payload is arbitrary JSON. Typed decoding happens in the sync layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Collection names, shared by every backend.
pub const PENDING_ACTIONS: &str = "pendingActions";
pub const MESSAGES: &str = "messages";
pub const USER_CACHE: &str = "userCache";
pub const SETTINGS_CACHE: &str = "settingsCache";
pub const FAILED_ACTIONS: &str = "failedActions";
pub const REPLAY_ATTEMPTS: &str = "replayAttempts";
pub const LOCKS: &str = "locks";

/// Store-assigned identifier of a pending action.
///
/// Identifiers increase monotonically and are never reused within a store,
/// so ordering by id is insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl ActionId {
    /// Get the raw id value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An action about to be queued. The store assigns its id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPendingAction {
    pub action_type: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

impl NewPendingAction {
    /// Create an action stamped with the current time
    pub fn new(action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
            enqueued_at: Utc::now(),
            user_id: None,
        }
    }

    /// Tag the action with the user who queued it
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Override the enqueue timestamp
    pub fn at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    pub(crate) fn into_pending(self, id: ActionId) -> PendingAction {
        PendingAction {
            id,
            action_type: self.action_type,
            payload: self.payload,
            enqueued_at: self.enqueued_at,
            user_id: self.user_id,
        }
    }
}

/// A queued action that has not been replayed successfully yet.
///
/// Entries are only ever inserted or deleted, never rewritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A pending action moved aside after too many failed replays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAction {
    pub action: PendingAction,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

/// Generic key/value cache collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheCollection {
    UserCache,
    SettingsCache,
}

impl CacheCollection {
    /// Collection name as persisted
    pub fn name(&self) -> &'static str {
        match self {
            CacheCollection::UserCache => USER_CACHE,
            CacheCollection::SettingsCache => SETTINGS_CACHE,
        }
    }
}

/// A locally cached copy of a chat message. Never authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    pub id: String,
    pub chat_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl CachedMessage {
    pub fn new(
        id: impl Into<String>,
        chat_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id: chat_id.into(),
            timestamp,
            data,
        }
    }
}

/// Merge freshly cached messages into a chat's cached list.
///
/// A message id already present is replaced in place. The result is ordered by
/// timestamp; messages with equal timestamps keep insertion order.
pub(crate) fn merge_messages(existing: &mut Vec<CachedMessage>, incoming: Vec<CachedMessage>) {
    for message in incoming {
        match existing.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => *slot = message,
            None => existing.push(message),
        }
    }
    existing.sort_by_key(|m| m.timestamp);
}

/// A short-lived lock record guarding a reconciliation run across tabs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLease {
    pub name: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl SyncLease {
    /// Whether the lease no longer protects anything at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether `owner` may take (or renew) this lease at `now`
    pub fn can_be_acquired_by(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.owner == owner || self.is_expired(now)
    }
}

/// Counts per collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub pending_actions: usize,
    pub failed_actions: usize,
    pub cached_chats: usize,
    pub cached_messages: usize,
    pub cached_values: usize,
}

//! External collaborators reached by the sync core.
//!
//! The authentication service and the document database are black boxes. The
//! core only needs a current identity from the former and single-record writes
//! and reads from the latter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

/// Remote collection names written by replay handlers.
pub const MESSAGES_COLLECTION: &str = "messages";
pub const TASKS_COLLECTION: &str = "tasks";
pub const ATTENDANCE_COLLECTION: &str = "attendance";

/// Errors reported by the document database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never reached the service or timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// The service refused the write (validation, permissions).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Whether the failure is about connectivity rather than the request itself
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// The signed-in user, as reported by the authentication service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Authentication collaborator.
#[trait_variant::make(Send)]
pub trait AuthProvider: Send + Sync {
    /// The current user, or `None` when signed out.
    async fn current_user(&self) -> Option<UserIdentity>;
}

/// Auth provider with a fixed identity.
#[derive(Clone, Debug, Default)]
pub struct StaticAuthProvider {
    user: Option<UserIdentity>,
}

impl StaticAuthProvider {
    pub fn signed_in(user: UserIdentity) -> Self {
        Self { user: Some(user) }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

impl AuthProvider for StaticAuthProvider {
    async fn current_user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }
}

/// Document-database collaborator.
///
/// Each call is a single remote write or read; no call spans collections.
#[trait_variant::make(Send)]
pub trait RemoteService: Send + Sync {
    /// Create a record and return its id.
    async fn create_record(&self, collection: &str, record: Value) -> Result<String, RemoteError>;

    /// Merge `fields` into an existing record.
    async fn update_record(&self, collection: &str, id: &str, fields: Value)
        -> Result<(), RemoteError>;

    /// Merge `fields` into a record, creating it if missing.
    async fn upsert_record(&self, collection: &str, id: &str, fields: Value)
        -> Result<(), RemoteError>;

    async fn fetch_user_profile(&self, user_id: &str) -> Result<Value, RemoteError>;

    async fn fetch_settings(&self, user_id: &str) -> Result<Value, RemoteError>;
}

/// Kind of a write observed by [`InMemoryRemote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    Upsert,
}

/// A successful write, in the order the service observed it.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteWrite {
    pub kind: WriteKind,
    pub collection: String,
    pub record_id: String,
    pub fields: Value,
}

/// Rule making matching writes fail
#[derive(Clone, Debug)]
struct RejectRule {
    collection: String,
    field: Option<(String, Value)>,
    error: RemoteError,
}

impl RejectRule {
    fn matches(&self, collection: &str, fields: &Value) -> bool {
        if self.collection != collection {
            return false;
        }
        match &self.field {
            Some((name, expected)) => fields.get(name) == Some(expected),
            None => true,
        }
    }
}

#[derive(Default)]
struct RemoteState {
    reachable: bool,
    records: HashMap<String, Vec<(String, Value)>>,
    writes: Vec<RemoteWrite>,
    rules: Vec<RejectRule>,
    profiles: HashMap<String, Value>,
    settings: HashMap<String, Value>,
    reads_fail: bool,
}

impl RemoteState {
    fn check_write(&self, collection: &str, fields: &Value) -> Result<(), RemoteError> {
        if !self.reachable {
            return Err(RemoteError::Network("service unreachable".to_string()));
        }
        match self.rules.iter().find(|rule| rule.matches(collection, fields)) {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }

    fn check_read(&self) -> Result<(), RemoteError> {
        if !self.reachable {
            return Err(RemoteError::Network("service unreachable".to_string()));
        }
        if self.reads_fail {
            return Err(RemoteError::Network("read timed out".to_string()));
        }
        Ok(())
    }

    fn find_mut(&mut self, collection: &str, id: &str) -> Option<&mut Value> {
        self.records
            .get_mut(collection)?
            .iter_mut()
            .find(|(record_id, _)| record_id == id)
            .map(|(_, value)| value)
    }
}

/// Merge the top-level fields of `fields` into `target`
fn merge_fields(target: &mut Value, fields: Value) {
    match (target.as_object_mut(), fields) {
        (Some(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key, value);
            }
        }
        (_, fields) => *target = fields,
    }
}

/// In-memory document database for development and tests.
///
/// Records every successful write in order and can be told to reject writes
/// or to behave as unreachable.
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState {
                reachable: true,
                ..RemoteState::default()
            }),
        }
    }

    /// Make every call fail with a network error while `false`
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    /// Reject every write to `collection`
    pub async fn reject_collection(&self, collection: &str, error: RemoteError) {
        self.state.lock().await.rules.push(RejectRule {
            collection: collection.to_string(),
            field: None,
            error,
        });
    }

    /// Reject writes to `collection` whose `field` equals `value`
    pub async fn reject_when(&self, collection: &str, field: &str, value: Value, error: RemoteError) {
        self.state.lock().await.rules.push(RejectRule {
            collection: collection.to_string(),
            field: Some((field.to_string(), value)),
            error,
        });
    }

    pub async fn clear_rejections(&self) {
        self.state.lock().await.rules.clear();
    }

    /// Make profile and settings reads fail
    pub async fn set_reads_fail(&self, fail: bool) {
        self.state.lock().await.reads_fail = fail;
    }

    pub async fn set_profile(&self, user_id: &str, profile: Value) {
        self.state
            .lock()
            .await
            .profiles
            .insert(user_id.to_string(), profile);
    }

    pub async fn set_settings(&self, user_id: &str, settings: Value) {
        self.state
            .lock()
            .await
            .settings
            .insert(user_id.to_string(), settings);
    }

    /// Seed a record without logging a write
    pub async fn insert_record(&self, collection: &str, id: &str, record: Value) {
        self.state
            .lock()
            .await
            .records
            .entry(collection.to_string())
            .or_default()
            .push((id.to_string(), record));
    }

    /// Every successful write so far
    pub async fn writes(&self) -> Vec<RemoteWrite> {
        self.state.lock().await.writes.clone()
    }

    /// Records of a collection, in creation order
    pub async fn records(&self, collection: &str) -> Vec<(String, Value)> {
        self.state
            .lock()
            .await
            .records
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn record(&self, collection: &str, id: &str) -> Option<Value> {
        self.state.lock().await.find_mut(collection, id).cloned()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteService for InMemoryRemote {
    async fn create_record(&self, collection: &str, record: Value) -> Result<String, RemoteError> {
        let mut state = self.state.lock().await;
        state.check_write(collection, &record)?;

        let id = uuid::Uuid::new_v4().to_string();
        state
            .records
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), record.clone()));
        state.writes.push(RemoteWrite {
            kind: WriteKind::Create,
            collection: collection.to_string(),
            record_id: id.clone(),
            fields: record,
        });
        Ok(id)
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.check_write(collection, &fields)?;

        let record = state
            .find_mut(collection, id)
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", collection, id)))?;
        merge_fields(record, fields.clone());
        state.writes.push(RemoteWrite {
            kind: WriteKind::Update,
            collection: collection.to_string(),
            record_id: id.to_string(),
            fields,
        });
        Ok(())
    }

    async fn upsert_record(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.check_write(collection, &fields)?;

        match state.find_mut(collection, id) {
            Some(record) => merge_fields(record, fields.clone()),
            None => state
                .records
                .entry(collection.to_string())
                .or_default()
                .push((id.to_string(), fields.clone())),
        }
        state.writes.push(RemoteWrite {
            kind: WriteKind::Upsert,
            collection: collection.to_string(),
            record_id: id.to_string(),
            fields,
        });
        Ok(())
    }

    async fn fetch_user_profile(&self, user_id: &str) -> Result<Value, RemoteError> {
        let state = self.state.lock().await;
        state.check_read()?;
        state
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("users/{}", user_id)))
    }

    async fn fetch_settings(&self, user_id: &str) -> Result<Value, RemoteError> {
        let state = self.state.lock().await;
        state.check_read()?;
        Ok(state.settings.get(user_id).cloned().unwrap_or(Value::Null))
    }
}

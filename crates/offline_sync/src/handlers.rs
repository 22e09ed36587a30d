//! Remote writes for each action kind.
//!
//! Every action maps to exactly one remote call. Writes made while replaying
//! the offline queue carry `offlineCreated: true` and the time the action was
//! queued, so other clients can show where a record came from.

use crate::action::{
    CreateTaskPayload, MoveTaskPayload, OfflineAction, SendMessagePayload, UpdateAttendancePayload,
};
use crate::remote::{
    RemoteError, RemoteService, ATTENDANCE_COLLECTION, MESSAGES_COLLECTION, TASKS_COLLECTION,
};
use chrono::{DateTime, Utc};
use local_store::PendingAction;
use serde_json::{json, Map, Value};

/// Field marking records written by offline replay
pub const OFFLINE_TAG_FIELD: &str = "offlineCreated";

/// Who wrote an action and when
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteContext {
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the write replays a queued action
    pub queued_at: Option<DateTime<Utc>>,
}

impl WriteContext {
    /// Context for an immediate write by `user_id`
    pub fn direct(user_id: Option<String>) -> Self {
        Self {
            user_id,
            created_at: Utc::now(),
            queued_at: None,
        }
    }

    /// Context for replaying a queued entry
    pub fn replay(pending: &PendingAction) -> Self {
        Self {
            user_id: pending.user_id.clone(),
            created_at: pending.enqueued_at,
            queued_at: Some(pending.enqueued_at),
        }
    }

    fn tag(&self, fields: &mut Map<String, Value>) {
        if let Some(queued_at) = self.queued_at {
            fields.insert(OFFLINE_TAG_FIELD.to_string(), Value::Bool(true));
            fields.insert("queuedAt".to_string(), json!(queued_at));
            fields.insert("syncedAt".to_string(), json!(Utc::now()));
        }
    }
}

/// Perform the remote write for `action`.
///
/// Returns the id of the created record for creates.
pub async fn apply<R: RemoteService>(
    remote: &R,
    action: &OfflineAction,
    ctx: &WriteContext,
) -> Result<Option<String>, RemoteError> {
    match action {
        OfflineAction::SendMessage(msg) => send_message(remote, msg, ctx).await.map(Some),
        OfflineAction::CreateTask(task) => create_task(remote, task, ctx).await.map(Some),
        OfflineAction::UpdateAttendance(entry) => {
            update_attendance(remote, entry, ctx).await.map(|_| None)
        }
        OfflineAction::MoveTask(mv) => move_task(remote, mv, ctx).await.map(|_| None),
    }
}

/// Convert a serialized payload struct into a mutable field map
fn fields_of(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn send_message<R: RemoteService>(
    remote: &R,
    msg: &SendMessagePayload,
    ctx: &WriteContext,
) -> Result<String, RemoteError> {
    let mut fields = fields_of(json!(msg));
    if let Some(user_id) = &ctx.user_id {
        fields.insert("senderId".to_string(), json!(user_id));
    }
    fields.insert("createdAt".to_string(), json!(ctx.created_at));
    fields.insert("readBy".to_string(), json!(ctx.user_id.iter().collect::<Vec<_>>()));
    ctx.tag(&mut fields);

    remote
        .create_record(MESSAGES_COLLECTION, Value::Object(fields))
        .await
}

async fn create_task<R: RemoteService>(
    remote: &R,
    task: &CreateTaskPayload,
    ctx: &WriteContext,
) -> Result<String, RemoteError> {
    let mut fields = fields_of(json!(task));
    if let Some(user_id) = &ctx.user_id {
        fields.insert("createdBy".to_string(), json!(user_id));
    }
    fields.insert("createdAt".to_string(), json!(ctx.created_at));
    ctx.tag(&mut fields);

    remote
        .create_record(TASKS_COLLECTION, Value::Object(fields))
        .await
}

/// Attendance records are one per user and day; entries merge into it
async fn update_attendance<R: RemoteService>(
    remote: &R,
    entry: &UpdateAttendancePayload,
    ctx: &WriteContext,
) -> Result<(), RemoteError> {
    let user_id = ctx
        .user_id
        .as_deref()
        .ok_or_else(|| RemoteError::Rejected("attendance requires a signed-in user".into()))?;
    let record_id = format!("{}_{}", user_id, entry.date);

    let mut fields = Map::new();
    fields.insert("userId".to_string(), json!(user_id));
    fields.insert("date".to_string(), json!(entry.date));
    fields.insert(entry.kind.field_name().to_string(), json!(entry.at));
    if let Some(note) = &entry.note {
        fields.insert("note".to_string(), json!(note));
    }
    ctx.tag(&mut fields);

    remote
        .upsert_record(ATTENDANCE_COLLECTION, &record_id, Value::Object(fields))
        .await
}

async fn move_task<R: RemoteService>(
    remote: &R,
    mv: &MoveTaskPayload,
    ctx: &WriteContext,
) -> Result<(), RemoteError> {
    let mut fields = Map::new();
    fields.insert("status".to_string(), json!(mv.to_status));
    if let Some(position) = mv.position {
        fields.insert("position".to_string(), json!(position));
    }
    if let Some(user_id) = &ctx.user_id {
        fields.insert("updatedBy".to_string(), json!(user_id));
    }
    fields.insert("updatedAt".to_string(), json!(ctx.created_at));
    if let Some(queued_at) = ctx.queued_at {
        fields.insert("offlineUpdated".to_string(), Value::Bool(true));
        fields.insert("queuedAt".to_string(), json!(queued_at));
    }

    remote
        .update_record(TASKS_COLLECTION, &mv.task_id, Value::Object(fields))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{AttendanceKind, TaskStatus};
    use crate::remote::{InMemoryRemote, WriteKind};
    use chrono::NaiveDate;
    use local_store::ActionId;

    fn queued(action: &OfflineAction, user: Option<&str>) -> PendingAction {
        PendingAction {
            id: ActionId(1),
            action_type: action.kind().as_str().to_string(),
            payload: action.payload().unwrap(),
            enqueued_at: Utc::now(),
            user_id: user.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_replayed_message_is_tagged() {
        let remote = InMemoryRemote::new();
        let action = OfflineAction::SendMessage(SendMessagePayload::text("c1", "hello"));
        let pending = queued(&action, Some("u1"));

        let id = apply(&remote, &action, &WriteContext::replay(&pending))
            .await
            .unwrap();
        assert!(id.is_some());

        let writes = remote.writes().await;
        assert_eq!(writes.len(), 1);
        let fields = &writes[0].fields;
        assert_eq!(writes[0].collection, MESSAGES_COLLECTION);
        assert_eq!(fields["chatId"], "c1");
        assert_eq!(fields["content"], "hello");
        assert_eq!(fields["senderId"], "u1");
        assert_eq!(fields[OFFLINE_TAG_FIELD], true);
        assert!(fields.get("queuedAt").is_some());
    }

    #[tokio::test]
    async fn test_direct_write_is_not_tagged() {
        let remote = InMemoryRemote::new();
        let action = OfflineAction::CreateTask(CreateTaskPayload::new("Plan sprint"));

        apply(&remote, &action, &WriteContext::direct(Some("u1".into())))
            .await
            .unwrap();

        let writes = remote.writes().await;
        assert_eq!(writes[0].collection, TASKS_COLLECTION);
        assert_eq!(writes[0].fields["createdBy"], "u1");
        assert!(writes[0].fields.get(OFFLINE_TAG_FIELD).is_none());
    }

    #[tokio::test]
    async fn test_attendance_upserts_per_user_and_day() {
        let remote = InMemoryRemote::new();
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let action = OfflineAction::UpdateAttendance(UpdateAttendancePayload {
            date,
            kind: AttendanceKind::ClockIn,
            at: Utc::now(),
            note: None,
        });

        apply(&remote, &action, &WriteContext::direct(Some("u1".into())))
            .await
            .unwrap();

        let writes = remote.writes().await;
        assert_eq!(writes[0].kind, WriteKind::Upsert);
        assert_eq!(writes[0].record_id, "u1_2024-05-02");
        assert!(writes[0].fields.get("clockIn").is_some());
    }

    #[tokio::test]
    async fn test_attendance_requires_user() {
        let remote = InMemoryRemote::new();
        let action = OfflineAction::UpdateAttendance(UpdateAttendancePayload {
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            kind: AttendanceKind::ClockOut,
            at: Utc::now(),
            note: None,
        });

        let err = apply(&remote, &action, &WriteContext::direct(None))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
        assert!(remote.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_move_task_updates_status() {
        let remote = InMemoryRemote::new();
        remote
            .insert_record(TASKS_COLLECTION, "t1", json!({"title": "A", "status": "todo"}))
            .await;
        let action = OfflineAction::MoveTask(MoveTaskPayload {
            task_id: "t1".into(),
            from_status: TaskStatus::Todo,
            to_status: TaskStatus::Done,
            position: None,
        });
        let pending = queued(&action, Some("u1"));

        apply(&remote, &action, &WriteContext::replay(&pending))
            .await
            .unwrap();

        let record = remote.record(TASKS_COLLECTION, "t1").await.unwrap();
        assert_eq!(record["status"], "done");
        assert_eq!(record["title"], "A");
        assert_eq!(record["offlineUpdated"], true);
    }
}

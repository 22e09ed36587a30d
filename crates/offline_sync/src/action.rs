//! Typed offline actions.
//!
//! Queued entries are stored as a type tag plus a JSON payload. This module
//! is the only place that converts between that stored shape and the typed
//! [`OfflineAction`] union, so replay dispatch is an exhaustive match.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveDate, Utc};
use local_store::{NewPendingAction, PendingAction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a queued action, as stored in the `type` field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SendMessage,
    CreateTask,
    UpdateAttendance,
    MoveTask,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::SendMessage,
        ActionKind::CreateTask,
        ActionKind::UpdateAttendance,
        ActionKind::MoveTask,
    ];

    /// The stored type tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SendMessage => "sendMessage",
            ActionKind::CreateTask => "createTask",
            ActionKind::UpdateAttendance => "updateAttendance",
            ActionKind::MoveTask => "moveTask",
        }
    }

    /// Look up a stored type tag. Unknown tags return `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub chat_id: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

impl SendMessagePayload {
    pub fn text(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            attachment_url: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Kanban column of a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
}

impl CreateTaskPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            project_id: None,
            title: title.into(),
            description: None,
            assignee_id: None,
            due_date: None,
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_assignee(mut self, assignee_id: impl Into<String>) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceKind {
    ClockIn,
    ClockOut,
    Leave,
}

impl AttendanceKind {
    /// Field of the attendance record this entry sets
    pub fn field_name(&self) -> &'static str {
        match self {
            AttendanceKind::ClockIn => "clockIn",
            AttendanceKind::ClockOut => "clockOut",
            AttendanceKind::Leave => "leave",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAttendancePayload {
    pub date: NaiveDate,
    pub kind: AttendanceKind,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskPayload {
    pub task_id: String,
    pub from_status: TaskStatus,
    pub to_status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// A user mutation that can be queued while offline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OfflineAction {
    SendMessage(SendMessagePayload),
    CreateTask(CreateTaskPayload),
    UpdateAttendance(UpdateAttendancePayload),
    MoveTask(MoveTaskPayload),
}

impl OfflineAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            OfflineAction::SendMessage(_) => ActionKind::SendMessage,
            OfflineAction::CreateTask(_) => ActionKind::CreateTask,
            OfflineAction::UpdateAttendance(_) => ActionKind::UpdateAttendance,
            OfflineAction::MoveTask(_) => ActionKind::MoveTask,
        }
    }

    /// Check the fields the remote service would refuse outright
    pub fn validate(&self) -> SyncResult<()> {
        match self {
            OfflineAction::SendMessage(msg) => {
                if msg.chat_id.trim().is_empty() {
                    return Err(SyncError::InvalidAction("message without chat".into()));
                }
                if msg.content.trim().is_empty() && msg.attachment_url.is_none() {
                    return Err(SyncError::InvalidAction("empty message".into()));
                }
            }
            OfflineAction::CreateTask(task) => {
                if task.title.trim().is_empty() {
                    return Err(SyncError::InvalidAction("task without title".into()));
                }
            }
            OfflineAction::UpdateAttendance(_) => {}
            OfflineAction::MoveTask(mv) => {
                if mv.task_id.trim().is_empty() {
                    return Err(SyncError::InvalidAction("move without task".into()));
                }
            }
        }
        Ok(())
    }

    /// The stored payload, without the type tag
    pub fn payload(&self) -> SyncResult<Value> {
        let value = match self {
            OfflineAction::SendMessage(p) => serde_json::to_value(p)?,
            OfflineAction::CreateTask(p) => serde_json::to_value(p)?,
            OfflineAction::UpdateAttendance(p) => serde_json::to_value(p)?,
            OfflineAction::MoveTask(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Build the store entry for this action
    pub fn to_new_pending(&self) -> SyncResult<NewPendingAction> {
        Ok(NewPendingAction::new(self.kind().as_str(), self.payload()?))
    }

    /// Decode a stored entry.
    ///
    /// Unknown type tags yield `UnrecognizedActionType` so newer clients'
    /// entries can be left alone. A known tag with a payload that does not
    /// parse yields `InvalidPayload`.
    pub fn from_pending(pending: &PendingAction) -> SyncResult<Self> {
        let kind = ActionKind::parse(&pending.action_type)
            .ok_or_else(|| SyncError::UnrecognizedActionType(pending.action_type.clone()))?;

        let payload = pending.payload.clone();
        let decoded = match kind {
            ActionKind::SendMessage => serde_json::from_value(payload).map(Self::SendMessage),
            ActionKind::CreateTask => serde_json::from_value(payload).map(Self::CreateTask),
            ActionKind::UpdateAttendance => {
                serde_json::from_value(payload).map(Self::UpdateAttendance)
            }
            ActionKind::MoveTask => serde_json::from_value(payload).map(Self::MoveTask),
        };

        decoded.map_err(|e| SyncError::InvalidPayload {
            id: pending.id,
            reason: e.to_string(),
        })
    }
}

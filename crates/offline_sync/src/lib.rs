//! Offline action queue and reconciliation for the groupware client.
//!
//! Mutations made while disconnected (chat messages, tasks, attendance,
//! Kanban moves) are persisted in the local store and replayed in order once
//! the connection comes back.
//!
//! # Modules
//!
//! - `action`: typed offline actions and their stored form
//! - `connectivity`: online/offline state with reconnect edge detection
//! - `queue`: the write path (`submit`, `save_for_offline_sync`)
//! - `reconcile`: replay of the queue against the remote service
//! - `scheduler`: background task running reconciliation on reconnect
//! - `handlers`: the remote write performed for each action kind
//! - `remote`: authentication and document-database collaborators
//! - `client`: a single handle over all of the above
//! - `config`, `error`, `logging`: ambient support

pub mod action;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod scheduler;

pub use action::{
    ActionKind, AttendanceKind, CreateTaskPayload, MessageType, MoveTaskPayload, OfflineAction,
    SendMessagePayload, TaskPriority, TaskStatus, UpdateAttendancePayload,
};
pub use client::OfflineSync;
pub use config::SyncConfig;
pub use connectivity::{
    ConnectionStatus, ConnectivityMonitor, ConnectivityState, SyncStatusInfo, Transition,
};
pub use error::{SyncError, SyncResult};
pub use queue::{OfflineQueue, SubmitOutcome};
pub use reconcile::{ReconcileOptions, ReconcileReport, ReconciliationRunner};
pub use remote::{
    AuthProvider, InMemoryRemote, RemoteError, RemoteService, StaticAuthProvider, UserIdentity,
};
pub use scheduler::SyncScheduler;

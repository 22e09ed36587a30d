//! Error types for the offline sync core.

use crate::remote::RemoteError;
use local_store::{ActionId, StoreError};
use thiserror::Error;

/// Errors that can occur on the offline write path and during replay
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The local store could not be opened at all
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An enqueue failed although the store was open before
    #[error("Offline queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The remote write for a queued action failed
    #[error("Replay of action {id} failed: {reason}")]
    ReplayHandlerFailure { id: ActionId, reason: String },

    /// A queued entry's type has no handler in this build
    #[error("Unrecognized action type: {0}")]
    UnrecognizedActionType(String),

    /// A queued entry's payload does not match its type
    #[error("Invalid payload for action {id}: {reason}")]
    InvalidPayload { id: ActionId, reason: String },

    /// The action was refused before it was queued or sent
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StorageUnavailable(reason) => SyncError::StorageUnavailable(reason),
            other => SyncError::Store(other),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidAction(err.to_string())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

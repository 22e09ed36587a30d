//! Error types for the local store.

use crate::record::ActionId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing the local store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be opened or has not been opened yet
    /// (read-only location, private mode, quota exhausted at startup).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage is full or quota exceeded
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    /// No pending action with this id
    #[error("Pending action not found: {0}")]
    NotFound(ActionId),
}

impl StoreError {
    /// Whether the store as a whole is unusable, as opposed to a single failed write.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

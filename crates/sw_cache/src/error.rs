//! Error types for the cache layer.

use crate::worker::WorkerState;
use thiserror::Error;

/// Errors produced by the cache worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The network request failed and no cached copy could stand in
    #[error("Network error: {0}")]
    Network(String),

    /// A manifest asset could not be pre-cached
    #[error("Install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    /// Activation was requested before a successful install
    #[error("Cache worker is not installed (state: {0:?})")]
    NotInstalled(WorkerState),

    /// The worker task is gone
    #[error("Cache worker stopped")]
    WorkerStopped,

    /// The request is not handled by the worker; fetch it directly
    #[error("Request not intercepted")]
    NotIntercepted,
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

//! Durable local storage for offline-capable clients.
//!
//! The store keeps, per origin:
//!
//! - the replay ledger of pending actions (auto-keyed, insertion ordered)
//! - cached chat messages (by chat, ordered by time)
//! - generic key/value caches for user and settings data
//! - dead-lettered actions, replay attempt counts and reconciliation leases
//!
//! # Modules
//!
//! - `store`: the `LocalStore` trait every backend implements
//! - `memory_store`: in-memory backend for tests and non-persistent sessions
//! - `file_store`: file-backed backend, one directory per origin
//! - `record`: persisted record types
//! - `error`: error types for the store
//!
//! # Example
//!
//! ```
//! use local_store::{LocalStore, MemoryLocalStore, NewPendingAction};
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let store = MemoryLocalStore::new();
//! store.initialize().await.unwrap();
//!
//! let id = store
//!     .enqueue_pending_action(NewPendingAction::new("sendMessage", json!({"chatId": "c1"})))
//!     .await
//!     .unwrap();
//!
//! let pending = store.list_pending_actions().await.unwrap();
//! assert_eq!(pending[0].id, id);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

pub mod error;
pub mod file_store;
pub mod memory_store;
pub mod record;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use file_store::{FileLocalStore, StoreConfig};
pub use memory_store::MemoryLocalStore;
pub use record::{
    ActionId, CacheCollection, CachedMessage, FailedAction, NewPendingAction, PendingAction,
    StoreStats, SyncLease,
};
pub use store::LocalStore;

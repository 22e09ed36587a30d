//! Service worker cache layer for the offline app shell.
//!
//! A [`CacheWorker`] pre-caches the static manifest on install, drops caches
//! left by earlier builds on activate, and then answers fetches:
//! navigations and static assets cache-first, API and storage requests
//! network-first. Everything else goes straight to the network.

pub mod classify;
pub mod config;
pub mod error;
pub mod network;
pub mod policy;
pub mod request;
pub mod storage;
pub mod worker;

pub use classify::{classify, RequestClass};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use network::{MockNetwork, Network};
pub use policy::{FetchOutcome, ResponseSource};
pub use request::{FetchRequest, Method, RequestMode, Response};
pub use storage::{Cache, CacheStorage};
pub use worker::{ActivateReport, CacheWorker, WorkerEvent, WorkerHandle, WorkerState};

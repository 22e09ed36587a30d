//! The network behind the cache worker.

use crate::error::{CacheError, CacheResult};
use crate::request::{FetchRequest, Response};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Performs real fetches for the worker
#[trait_variant::make(Send)]
pub trait Network: Send + Sync {
    /// Fetch `request`. Any HTTP status is a successful fetch; only
    /// transport failures are errors.
    async fn fetch(&self, request: &FetchRequest) -> CacheResult<Response>;
}

#[derive(Default)]
struct MockState {
    offline: bool,
    routes: HashMap<String, Response>,
    failing: HashMap<String, String>,
    requests: Vec<String>,
}

/// Scripted network for tests and local development.
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct MockNetwork {
    state: Mutex<MockState>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn route(&self, url: &str, response: Response) {
        self.state
            .lock()
            .await
            .routes
            .insert(url.to_string(), response);
    }

    /// Make fetches of one URL fail at the transport level
    pub async fn fail(&self, url: &str, reason: &str) {
        self.state
            .lock()
            .await
            .failing
            .insert(url.to_string(), reason.to_string());
    }

    /// Make every fetch fail
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// URLs requested so far, in order
    pub async fn requests(&self) -> Vec<String> {
        self.state.lock().await.requests.clone()
    }
}

impl Network for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> CacheResult<Response> {
        let mut state = self.state.lock().await;
        state.requests.push(request.url.clone());

        if state.offline {
            return Err(CacheError::Network("offline".to_string()));
        }
        if let Some(reason) = state.failing.get(&request.url) {
            return Err(CacheError::Network(reason.clone()));
        }
        Ok(state
            .routes
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

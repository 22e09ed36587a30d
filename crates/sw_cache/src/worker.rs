//! The cache worker actor.
//!
//! One long-lived task owns the [`CacheStorage`] and handles lifecycle and
//! fetch events one at a time, like a service worker's event loop. Callers
//! talk to it through a [`WorkerHandle`]; every event carries a oneshot
//! channel for its reply.

use crate::classify::{classify, RequestClass};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::network::Network;
use crate::policy::{self, FetchOutcome};
use crate::request::FetchRequest;
use crate::storage::CacheStorage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, not installed
    Parsed,
    /// Manifest pre-cached
    Installed,
    /// Controlling pages; fetches are intercepted
    Activated,
    /// Install failed; the previous worker stays in charge
    Redundant,
}

/// Summary of an activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted_caches: Vec<String>,
    pub clients_claimed: bool,
}

/// Events processed by the worker task
#[derive(Debug)]
pub enum WorkerEvent {
    Install {
        reply: oneshot::Sender<CacheResult<usize>>,
    },
    Activate {
        reply: oneshot::Sender<CacheResult<ActivateReport>>,
    },
    Fetch {
        request: FetchRequest,
        reply: oneshot::Sender<CacheResult<FetchOutcome>>,
    },
    State {
        reply: oneshot::Sender<WorkerState>,
    },
    CacheNames {
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Stop after the events already queued
    Shutdown,
}

/// The worker: configuration, caches and the network it fronts
pub struct CacheWorker<N> {
    config: CacheConfig,
    storage: CacheStorage,
    network: Arc<N>,
    state: WorkerState,
}

impl<N: Network + 'static> CacheWorker<N> {
    /// Spawn a worker with empty caches
    pub fn spawn(config: CacheConfig, network: Arc<N>) -> WorkerHandle {
        Self::spawn_with_storage(config, network, CacheStorage::new())
    }

    /// Spawn a worker over caches left by an earlier build
    pub fn spawn_with_storage(
        config: CacheConfig,
        network: Arc<N>,
        storage: CacheStorage,
    ) -> WorkerHandle {
        let worker = CacheWorker {
            config,
            storage,
            network,
            state: WorkerState::Parsed,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker.run(rx));
        WorkerHandle {
            tx,
            task: Arc::new(std::sync::Mutex::new(Some(task))),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerEvent>) {
        tracing::debug!("Cache worker {} started", self.config.build_tag);
        while let Some(event) = rx.recv().await {
            if matches!(event, WorkerEvent::Shutdown) {
                break;
            }
            self.handle(event).await;
        }
        tracing::debug!("Cache worker {} stopped", self.config.build_tag);
    }

    async fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Install { reply } => {
                let result = self.install().await;
                let _ = reply.send(result);
            }
            WorkerEvent::Activate { reply } => {
                let _ = reply.send(self.activate());
            }
            WorkerEvent::Fetch { request, reply } => {
                let result = self.fetch(&request).await;
                let _ = reply.send(result);
            }
            WorkerEvent::State { reply } => {
                let _ = reply.send(self.state);
            }
            WorkerEvent::CacheNames { reply } => {
                let _ = reply.send(self.storage.keys());
            }
            WorkerEvent::Shutdown => {}
        }
    }

    async fn install(&mut self) -> CacheResult<usize> {
        match policy::precache(&self.config, &mut self.storage, self.network.as_ref()).await {
            Ok(count) => {
                self.state = WorkerState::Installed;
                tracing::info!(
                    "Cache worker {} installed, {} assets pre-cached",
                    self.config.build_tag,
                    count
                );
                Ok(count)
            }
            Err(e) => {
                self.state = WorkerState::Redundant;
                tracing::error!("Cache worker {} install failed: {}", self.config.build_tag, e);
                Err(e)
            }
        }
    }

    fn activate(&mut self) -> CacheResult<ActivateReport> {
        match self.state {
            WorkerState::Installed | WorkerState::Activated => {}
            state @ (WorkerState::Parsed | WorkerState::Redundant) => {
                return Err(CacheError::NotInstalled(state));
            }
        }

        let deleted_caches = policy::prune_stale(&self.config, &mut self.storage);
        self.state = WorkerState::Activated;
        tracing::info!("Cache worker {} activated, clients claimed", self.config.build_tag);
        Ok(ActivateReport {
            deleted_caches,
            clients_claimed: true,
        })
    }

    async fn fetch(&mut self, request: &FetchRequest) -> CacheResult<FetchOutcome> {
        if self.state != WorkerState::Activated {
            return Err(CacheError::NotIntercepted);
        }

        let class = classify(&self.config, request);
        let network = self.network.as_ref();
        match class {
            RequestClass::Passthrough => Err(CacheError::NotIntercepted),
            RequestClass::Navigation | RequestClass::StaticAsset => {
                policy::cache_first(&self.config, &mut self.storage, network, class, request).await
            }
            RequestClass::Api | RequestClass::Storage => {
                policy::network_first(&self.config, &mut self.storage, network, request).await
            }
        }
    }
}

/// Cloneable handle to a running cache worker
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerEvent>,
    task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent,
    ) -> CacheResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| CacheError::WorkerStopped)?;
        rx.await.map_err(|_| CacheError::WorkerStopped)
    }

    /// Pre-cache the static manifest; returns the number of assets stored
    pub async fn install(&self) -> CacheResult<usize> {
        self.request(|reply| WorkerEvent::Install { reply }).await?
    }

    /// Delete stale caches and take control of open pages
    pub async fn activate(&self) -> CacheResult<ActivateReport> {
        self.request(|reply| WorkerEvent::Activate { reply }).await?
    }

    /// Handle a fetch. `NotIntercepted` means the caller should go to the
    /// network itself.
    pub async fn fetch(&self, request: FetchRequest) -> CacheResult<FetchOutcome> {
        self.request(|reply| WorkerEvent::Fetch { request, reply })
            .await?
    }

    pub async fn state(&self) -> CacheResult<WorkerState> {
        self.request(|reply| WorkerEvent::State { reply }).await
    }

    pub async fn cache_names(&self) -> CacheResult<Vec<String>> {
        self.request(|reply| WorkerEvent::CacheNames { reply }).await
    }

    /// Stop the worker once the events already sent are handled.
    ///
    /// Other clones of the handle get `WorkerStopped` afterwards.
    pub async fn shutdown(self) {
        let _ = self.tx.send(WorkerEvent::Shutdown);
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Cache worker task failed: {}", e);
            }
        }
    }
}

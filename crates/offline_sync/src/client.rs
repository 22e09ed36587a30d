//! One handle wiring the monitor, queue, runner and scheduler together.

use crate::action::OfflineAction;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, SyncStatusInfo, Transition};
use crate::error::{SyncError, SyncResult};
use crate::queue::{OfflineQueue, SubmitOutcome};
use crate::reconcile::{ReconcileOptions, ReconcileReport, ReconciliationRunner};
use crate::remote::{AuthProvider, RemoteService};
use crate::scheduler::SyncScheduler;
use local_store::{FileLocalStore, LocalStore};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Offline sync for one client session
pub struct OfflineSync<S, R, A> {
    monitor: ConnectivityMonitor,
    queue: OfflineQueue<S, R, A>,
    runner: Arc<ReconciliationRunner<S, R, A>>,
    scheduler: SyncScheduler,
}

impl<S, R, A> OfflineSync<S, R, A>
where
    S: LocalStore + 'static,
    R: RemoteService + 'static,
    A: AuthProvider + 'static,
{
    /// Open the store and start the background scheduler.
    ///
    /// When starting online with actions left from an earlier session, a
    /// pass is requested right away.
    pub async fn start(
        store: Arc<S>,
        remote: Arc<R>,
        auth: Arc<A>,
        config: &SyncConfig,
        initially_online: bool,
    ) -> SyncResult<Self> {
        config.validate()?;

        let monitor = ConnectivityMonitor::new(initially_online);
        let queue =
            OfflineQueue::open(store.clone(), remote.clone(), auth.clone(), monitor.clone()).await;
        let runner = Arc::new(ReconciliationRunner::new(
            store,
            remote,
            auth,
            ReconcileOptions::from_config(config),
        ));
        let scheduler = SyncScheduler::spawn(
            monitor.clone(),
            runner.clone(),
            config.settle_delay(),
            config.retry_delay(),
        );

        if initially_online && queue.pending_count().await? > 0 {
            tracing::info!("Found queued actions from an earlier session");
            scheduler.trigger_now();
        }

        Ok(Self {
            monitor,
            queue,
            runner,
            scheduler,
        })
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn queue(&self) -> &OfflineQueue<S, R, A> {
        &self.queue
    }

    /// Forward a browser connectivity event
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        self.monitor.set_online(online)
    }

    /// Submit a user mutation; see [`OfflineQueue::submit`].
    ///
    /// An action queued while online (the direct write hit a network error)
    /// gets a pass requested right away, since no reconnect will trigger one.
    pub async fn submit(&self, action: OfflineAction) -> SyncResult<SubmitOutcome> {
        let outcome = self.queue.submit(action).await?;
        if outcome.is_queued() && self.monitor.is_online() {
            self.scheduler.trigger_now();
        }
        Ok(outcome)
    }

    pub async fn status_info(&self) -> SyncStatusInfo {
        let pending = match self.queue.pending_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Could not count pending actions: {}", e);
                0
            }
        };
        self.monitor.status_info(pending)
    }

    /// Run a pass in the caller's task, bypassing the scheduler
    pub async fn reconcile_now(&self) -> ReconcileReport {
        self.runner.run().await
    }

    /// Ask the scheduler for a pass
    pub fn request_reconcile(&self) {
        self.scheduler.trigger_now();
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<ReconcileReport> {
        self.scheduler.subscribe()
    }

    /// Wipe all local data, queued actions included. For explicit logout.
    pub async fn logout(&self) -> SyncResult<()> {
        if !self.queue.is_available() {
            return Ok(());
        }
        let pending = self.queue.pending_count().await?;
        if pending > 0 {
            tracing::warn!("Discarding {} queued actions on logout", pending);
        }
        self.queue.store().clear_all().await?;
        Ok(())
    }

    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }
}

impl<R, A> OfflineSync<FileLocalStore, R, A>
where
    R: RemoteService + 'static,
    A: AuthProvider + 'static,
{
    /// Start with the file-backed store named in `config.store`
    pub async fn with_file_store(
        remote: Arc<R>,
        auth: Arc<A>,
        config: &SyncConfig,
        initially_online: bool,
    ) -> SyncResult<Self> {
        let store_config = config
            .store
            .as_ref()
            .ok_or_else(|| SyncError::Config("no store location configured".into()))?;
        tracing::info!("Local store at {}", store_config.database_path().display());

        let store = Arc::new(FileLocalStore::with_config(store_config));
        Self::start(store, remote, auth, config, initially_online).await
    }
}

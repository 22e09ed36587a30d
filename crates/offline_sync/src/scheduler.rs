//! Background task that reconciles on reconnect.
//!
//! The scheduler watches the connectivity monitor. On every Offline → Online
//! edge it waits the settle delay; if the connection drops again during the
//! wait the edge is ignored (the next reconnect triggers instead). Otherwise
//! it runs one reconciliation pass and clears `was_offline`, whether or not
//! the pass replayed everything. A reconnect that happens while the pass runs
//! gets a pass of its own.
//!
//! When a pass finds the remote unreachable while the browser still reports
//! online, no edge will come; the scheduler retries after the retry delay.

use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::reconcile::{ReconcileReport, ReconciliationRunner};
use crate::remote::{AuthProvider, RemoteService};
use local_store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Handle to the background reconciliation task
pub struct SyncScheduler {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    reports: broadcast::Sender<ReconcileReport>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Spawn the task on the current tokio runtime
    pub fn spawn<S, R, A>(
        monitor: ConnectivityMonitor,
        runner: Arc<ReconciliationRunner<S, R, A>>,
        settle_delay: Duration,
        retry_delay: Duration,
    ) -> Self
    where
        S: LocalStore + 'static,
        R: RemoteService + 'static,
        A: AuthProvider + 'static,
    {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (reports, _) = broadcast::channel(16);

        let task = SchedulerTask {
            state_rx: monitor.subscribe(),
            monitor,
            runner,
            settle_delay,
            retry_delay,
            retry_at: None,
            reports: reports.clone(),
        };
        let handle = tokio::spawn(task.run(trigger_rx, shutdown_rx));

        Self {
            trigger_tx,
            shutdown_tx: Some(shutdown_tx),
            reports,
            handle: Some(handle),
        }
    }

    /// Request a pass now, e.g. at startup when online with a non-empty queue.
    ///
    /// Ignored while offline. Requests made while a pass is running are
    /// coalesced.
    pub fn trigger_now(&self) {
        if self.trigger_tx.try_send(()).is_err() {
            tracing::debug!("Reconciliation request dropped, one is already waiting");
        }
    }

    /// Receive a report after every pass
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileReport> {
        self.reports.subscribe()
    }

    /// Stop the task and wait for it; a running pass finishes first
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Sync scheduler task failed: {}", e);
            }
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

struct SchedulerTask<S, R, A> {
    monitor: ConnectivityMonitor,
    state_rx: watch::Receiver<ConnectivityState>,
    runner: Arc<ReconciliationRunner<S, R, A>>,
    settle_delay: Duration,
    retry_delay: Duration,
    /// Next retry after a pass that could not reach the remote
    retry_at: Option<Instant>,
    reports: broadcast::Sender<ReconcileReport>,
}

impl<S, R, A> SchedulerTask<S, R, A>
where
    S: LocalStore,
    R: RemoteService,
    A: AuthProvider,
{
    async fn run(mut self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: oneshot::Receiver<()>) {
        tracing::debug!("Sync scheduler started");

        // An edge may have happened before the task subscribed
        let pending_edge = self.state_rx.borrow_and_update().needs_reconcile();
        if pending_edge {
            self.on_reconnect().await;
        }

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *self.state_rx.borrow_and_update();
                    if state.needs_reconcile() {
                        self.on_reconnect().await;
                    }
                }
                Some(()) = trigger_rx.recv() => {
                    if self.monitor.is_online() {
                        self.reconcile().await;
                    } else {
                        tracing::debug!("Ignoring reconciliation request while offline");
                    }
                }
                _ = sleep_until_retry(self.retry_at), if self.retry_at.is_some() => {
                    self.retry_at = None;
                    if self.monitor.is_online() {
                        tracing::debug!("Retrying reconciliation, remote was unreachable");
                        self.reconcile().await;
                    }
                }
            }
        }

        tracing::debug!("Sync scheduler stopped");
    }

    async fn on_reconnect(&mut self) {
        loop {
            if !self.settle().await {
                tracing::debug!("Connection dropped during settle delay, skipping reconciliation");
                return;
            }

            let edge = self.state_rx.borrow_and_update().reconnects;
            self.reconcile().await;
            let finished = self.monitor.finish_reconnect(edge);
            // Our own clear must not count as a new edge
            let state = *self.state_rx.borrow_and_update();
            if finished || !state.needs_reconcile() {
                return;
            }
            tracing::debug!("Reconnected again during reconciliation, running another pass");
        }
    }

    /// Wait out the settle delay; `false` if the connection dropped meanwhile
    async fn settle(&mut self) -> bool {
        let deadline = tokio::time::sleep(self.settle_delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return self.monitor.is_online(),
                changed = self.state_rx.changed() => {
                    if changed.is_err() || !self.state_rx.borrow_and_update().is_online {
                        return false;
                    }
                }
            }
        }
    }

    async fn reconcile(&mut self) {
        self.monitor.set_syncing(true);
        let report = self.runner.run().await;
        self.monitor.set_syncing(false);

        if !report.skipped_lease_held && !report.lease_lost && report.store_error.is_none() {
            self.monitor.mark_synced();
        }
        self.retry_at = if report.should_retry() && self.monitor.is_online() {
            Some(Instant::now() + self.retry_delay)
        } else {
            None
        };

        // No subscribers is fine
        let _ = self.reports.send(report);
    }
}

async fn sleep_until_retry(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

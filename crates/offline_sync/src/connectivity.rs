//! Connectivity tracking.
//!
//! The monitor turns browser `online`/`offline` events into a
//! [`ConnectivityState`] with edge detection:
//!
//! - Offline → Online sets `was_offline`, which stays set until the
//!   scheduler reports that one reconciliation attempt has finished.
//! - Online → Offline only flips `is_online`.
//! - Repeating the current state is a no-op.
//!
//! State is published on a `tokio::sync::watch` channel; clones of the
//! monitor share it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot published to subscribers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    pub is_online: bool,
    /// Set on the Offline → Online edge until a reconciliation attempt ends
    pub was_offline: bool,
    /// Number of Offline → Online edges so far
    pub reconnects: u64,
}

impl ConnectivityState {
    /// Whether this state calls for a reconciliation pass
    pub fn needs_reconcile(&self) -> bool {
        self.is_online && self.was_offline
    }
}

/// Connection status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Connected
    Online,
    /// Disconnected, actions queued locally
    #[default]
    Offline,
    /// Replaying queued actions
    Syncing,
}

/// Effect of a connectivity event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

struct MonitorShared {
    state: watch::Sender<ConnectivityState>,
    syncing: AtomicBool,
    /// Unix seconds of the last finished reconciliation, 0 if none
    last_sync: AtomicI64,
}

/// Connectivity monitor
///
/// Cheap to clone; every clone observes and updates the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    shared: Arc<MonitorShared>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the initial browser state
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(ConnectivityState {
            is_online: initially_online,
            was_offline: false,
            reconnects: 0,
        });
        Self {
            shared: Arc::new(MonitorShared {
                state,
                syncing: AtomicBool::new(false),
                last_sync: AtomicI64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.shared.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online
    }

    /// Apply a browser connectivity event
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let mut transition = None;
        self.shared.state.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            state.is_online = online;
            if online {
                state.was_offline = true;
                state.reconnects += 1;
                transition = Some(Transition::WentOnline);
            } else {
                transition = Some(Transition::WentOffline);
            }
            true
        });

        match transition {
            Some(Transition::WentOnline) => tracing::info!("Connection restored"),
            Some(Transition::WentOffline) => tracing::info!("Connection lost, queueing actions locally"),
            None => {}
        }
        transition
    }

    /// Clear `was_offline` for a pass that started after edge `reconnects`.
    ///
    /// Returns `false`, leaving the flag set, when another reconnect happened
    /// since: actions queued in that offline window may have missed the pass.
    pub fn finish_reconnect(&self, reconnects: u64) -> bool {
        let mut current = true;
        self.shared.state.send_if_modified(|state| {
            if state.reconnects != reconnects {
                current = false;
                return false;
            }
            let changed = state.was_offline;
            state.was_offline = false;
            changed
        });
        current
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.shared.state.subscribe()
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        self.shared.syncing.store(syncing, Ordering::SeqCst);
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::SeqCst)
    }

    /// Record that a reconciliation pass finished now
    pub fn mark_synced(&self) {
        self.shared
            .last_sync
            .store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    /// Seconds since the last finished reconciliation
    pub fn time_since_sync(&self) -> Option<u64> {
        match self.shared.last_sync.load(Ordering::SeqCst) {
            0 => None,
            at => Some(Utc::now().timestamp().saturating_sub(at).max(0) as u64),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        if !self.is_online() {
            ConnectionStatus::Offline
        } else if self.is_syncing() {
            ConnectionStatus::Syncing
        } else {
            ConnectionStatus::Online
        }
    }

    /// Get status info for UI display
    pub fn status_info(&self, pending_changes: usize) -> SyncStatusInfo {
        let status = self.status();
        let status_message = match (status, pending_changes) {
            (ConnectionStatus::Online, 0) => "Up to date".to_string(),
            (ConnectionStatus::Online, n) => format!("{} waiting to send", queued_actions(n)),
            (ConnectionStatus::Offline, 0) => "Offline".to_string(),
            (ConnectionStatus::Offline, n) => {
                format!("Offline, {} will send on reconnect", queued_actions(n))
            }
            (ConnectionStatus::Syncing, 0) => "Syncing".to_string(),
            (ConnectionStatus::Syncing, n) => format!("Sending {}", queued_actions(n)),
        };

        SyncStatusInfo {
            status,
            pending_changes,
            time_since_sync: self.time_since_sync(),
            status_message,
        }
    }
}

/// UI display information for the offline indicator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusInfo {
    pub status: ConnectionStatus,
    pub pending_changes: usize,
    pub time_since_sync: Option<u64>,
    pub status_message: String,
}

fn queued_actions(n: usize) -> String {
    if n == 1 {
        "1 queued action".to_string()
    } else {
        format!("{} queued actions", n)
    }
}

impl SyncStatusInfo {
    /// Badge for the chat header; `None` when online with an empty queue.
    ///
    /// A queue count wins over the connection label so the user sees how
    /// much is still unsent.
    pub fn badge(&self) -> Option<String> {
        match (self.status, self.pending_changes) {
            (ConnectionStatus::Online, 0) => None,
            (ConnectionStatus::Offline, 0) => Some("offline".to_string()),
            (ConnectionStatus::Syncing, 0) => Some("syncing".to_string()),
            (_, n) => Some(format!("{} queued", n)),
        }
    }

    /// Footer text for the last finished pass
    pub fn last_synced_label(&self) -> String {
        match self.time_since_sync {
            None => "Not synced yet".to_string(),
            Some(seconds) if seconds < 60 => "Synced just now".to_string(),
            Some(seconds) if seconds < 3600 => format!("Synced {} min ago", seconds / 60),
            Some(seconds) if seconds < 86_400 => format!("Synced {} h ago", seconds / 3600),
            Some(_) => "Synced over a day ago".to_string(),
        }
    }
}

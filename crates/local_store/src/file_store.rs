//! File-based local store implementation.
//!
//! `FileLocalStore` persists every collection of one origin under its own
//! directory, so pending actions survive reloads and restarts.
//!
//! # Directory Structure
//!
//! ```text
//! {root}/{origin}/
//!     ├── metadata.json          # Next action id
//!     ├── pendingActions.jsonl   # Pending actions, one JSON object per line
//!     ├── replayAttempts.json    # Failed replay counts by action id
//!     ├── failedActions.json     # Dead-lettered actions
//!     ├── messages.json          # Cached messages by chat id
//!     ├── userCache.json
//!     ├── settingsCache.json
//!     └── locks.json             # Reconciliation leases
//! ```
//!
//! Every call reads the files it needs and writes back what it changed, so two
//! store instances opened on the same directory (two tabs) observe each other's
//! writes. Each call runs under an exclusive OS lock on `.lock` in the
//! directory, which serializes transactions across instances and processes.
//! Whole-file rewrites go through a uniquely named temp file and an atomic
//! rename.

use crate::error::{StoreError, StoreResult};
use crate::record::{
    merge_messages, ActionId, CacheCollection, CachedMessage, FailedAction, NewPendingAction,
    PendingAction, StoreStats, SyncLease, FAILED_ACTIONS, LOCKS, MESSAGES, PENDING_ACTIONS,
    REPLAY_ATTEMPTS,
};
use crate::store::LocalStore;
use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

const METADATA_FILE: &str = "metadata.json";
const LOCK_FILE: &str = ".lock";

/// Configuration for a file-backed store
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Root directory holding one database directory per origin
    pub root: PathBuf,
    /// Origin the database belongs to (e.g. `https://app.example.com`)
    pub origin: String,
    /// Maximum number of pending actions, if limited
    pub pending_quota: Option<usize>,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>, origin: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            origin: origin.into(),
            pending_quota: None,
        }
    }

    /// Limit the number of pending actions
    pub fn with_pending_quota(mut self, quota: usize) -> Self {
        self.pending_quota = Some(quota);
        self
    }

    /// Directory of this origin's database
    pub fn database_path(&self) -> PathBuf {
        self.root.join(origin_dir_name(&self.origin))
    }
}

/// Turn an origin into a safe directory name
fn origin_dir_name(origin: &str) -> String {
    let name: String = origin
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "default".to_string()
    } else {
        name
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreMetadata {
    next_id: u64,
}

/// File-based implementation of `LocalStore`
pub struct FileLocalStore {
    /// Directory of this origin's database
    base_path: PathBuf,
    pending_quota: Option<usize>,
    initialized: AtomicBool,
    /// Serializes transactions within this instance
    txn: Mutex<()>,
}

impl FileLocalStore {
    /// Create a store rooted at `base_path`. Nothing is touched until `initialize`.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            pending_quota: None,
            initialized: AtomicBool::new(false),
            txn: Mutex::new(()),
        }
    }

    /// Create a store for the origin described by `config`
    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            pending_quota: config.pending_quota,
            ..Self::new(config.database_path())
        }
    }

    /// Directory holding this store's files
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn file(&self, collection: &str, extension: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", collection, extension))
    }

    fn pending_path(&self) -> PathBuf {
        self.file(PENDING_ACTIONS, "jsonl")
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::StorageUnavailable(
                "store not initialized".to_string(),
            ))
        }
    }

    /// Run `f` holding the directory lock shared by every instance on this
    /// directory, in this process or another.
    ///
    /// `f` must not await: the lock is a blocking OS lock.
    fn locked<T>(&self, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.base_path.join(LOCK_FILE))?;
        lock_file.lock_exclusive()?;

        let result = f();

        if let Err(e) = FileExt::unlock(&lock_file) {
            tracing::warn!("Could not unlock {}: {}", self.base_path.display(), e);
        }
        result
    }

    fn open_directory(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path)?;
        self.locked(|| {
            let metadata_path = self.base_path.join(METADATA_FILE);
            let metadata: StoreMetadata = read_json(&metadata_path)?;
            // Rewriting the metadata doubles as a writability check.
            write_json_atomic(&metadata_path, &metadata)
        })
    }

    fn next_action_id(&self) -> StoreResult<ActionId> {
        let metadata_path = self.base_path.join(METADATA_FILE);
        let mut metadata: StoreMetadata = read_json(&metadata_path)?;
        metadata.next_id += 1;
        write_json_atomic(&metadata_path, &metadata)?;
        Ok(ActionId(metadata.next_id))
    }

    fn read_attempts(&self) -> StoreResult<BTreeMap<u64, u32>> {
        read_json(&self.file(REPLAY_ATTEMPTS, "json"))
    }

    fn write_attempts(&self, attempts: &BTreeMap<u64, u32>) -> StoreResult<()> {
        write_json_atomic(&self.file(REPLAY_ATTEMPTS, "json"), attempts)
    }

    fn read_failed(&self) -> StoreResult<Vec<FailedAction>> {
        read_json(&self.file(FAILED_ACTIONS, "json"))
    }

    fn read_messages(&self) -> StoreResult<BTreeMap<String, Vec<CachedMessage>>> {
        read_json(&self.file(MESSAGES, "json"))
    }

    fn read_cache(&self, collection: CacheCollection) -> StoreResult<BTreeMap<String, Value>> {
        read_json(&self.file(collection.name(), "json"))
    }

    fn read_locks(&self) -> StoreResult<BTreeMap<String, SyncLease>> {
        read_json(&self.file(LOCKS, "json"))
    }

    /// Drop a pending action and its attempt count, returning the removed action
    fn remove_pending_unlocked(&self, id: ActionId) -> StoreResult<Option<(PendingAction, u32)>> {
        let path = self.pending_path();
        let mut pending = read_pending(&path)?;
        let Some(index) = pending.iter().position(|a| a.id == id) else {
            return Ok(None);
        };
        let action = pending.remove(index);
        rewrite_pending(&path, &pending)?;

        let mut attempts = self.read_attempts()?;
        let count = attempts.remove(&id.value()).unwrap_or(0);
        self.write_attempts(&attempts)?;

        Ok(Some((action, count)))
    }
}

impl LocalStore for FileLocalStore {
    async fn initialize(&self) -> StoreResult<()> {
        let _guard = self.txn.lock().await;

        self.open_directory().map_err(|e| {
            tracing::warn!(
                "Local store at {} unavailable: {}",
                self.base_path.display(),
                e
            );
            StoreError::StorageUnavailable(format!("{}: {}", self.base_path.display(), e))
        })?;

        self.initialized.store(true, Ordering::SeqCst);
        tracing::debug!("Local store opened at {}", self.base_path.display());
        Ok(())
    }

    async fn enqueue_pending_action(&self, action: NewPendingAction) -> StoreResult<ActionId> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            let path = self.pending_path();
            if let Some(quota) = self.pending_quota {
                if read_pending(&path)?.len() >= quota {
                    return Err(StoreError::QuotaExceeded);
                }
            }

            let id = self.next_action_id()?;
            append_pending(&path, &action.into_pending(id))?;
            Ok(id)
        })
    }

    async fn list_pending_actions(&self) -> StoreResult<Vec<PendingAction>> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| read_pending(&self.pending_path()))
    }

    async fn remove_pending_action(&self, id: ActionId) -> StoreResult<()> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| self.remove_pending_unlocked(id).map(|_| ()))
    }

    async fn get_cached_value(
        &self,
        collection: CacheCollection,
        key: &str,
    ) -> StoreResult<Option<Value>> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| Ok(self.read_cache(collection)?.remove(key)))
    }

    async fn set_cached_value(
        &self,
        collection: CacheCollection,
        key: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| {
            let mut cache = self.read_cache(collection)?;
            cache.insert(key.to_string(), value);
            write_json_atomic(&self.file(collection.name(), "json"), &cache)
        })
    }

    async fn cache_messages(
        &self,
        chat_id: &str,
        messages: Vec<CachedMessage>,
    ) -> StoreResult<()> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| {
            let mut all = self.read_messages()?;
            merge_messages(all.entry(chat_id.to_string()).or_default(), messages);
            write_json_atomic(&self.file(MESSAGES, "json"), &all)
        })
    }

    async fn cached_messages(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| Ok(self.read_messages()?.remove(chat_id).unwrap_or_default()))
    }

    async fn record_replay_failure(&self, id: ActionId) -> StoreResult<u32> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            if !read_pending(&self.pending_path())?.iter().any(|a| a.id == id) {
                return Err(StoreError::NotFound(id));
            }

            let mut attempts = self.read_attempts()?;
            let count = attempts.entry(id.value()).or_insert(0);
            *count += 1;
            let count = *count;
            self.write_attempts(&attempts)?;
            Ok(count)
        })
    }

    async fn replay_attempts(&self, id: ActionId) -> StoreResult<u32> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| Ok(self.read_attempts()?.get(&id.value()).copied().unwrap_or(0)))
    }

    async fn move_to_failed(&self, id: ActionId, last_error: &str) -> StoreResult<FailedAction> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            // Write the dead letter before deleting the pending entry so a crash in
            // between leaves a duplicate rather than a lost action.
            let pending = read_pending(&self.pending_path())?;
            let action = pending
                .into_iter()
                .find(|a| a.id == id)
                .ok_or(StoreError::NotFound(id))?;
            let attempts = self.read_attempts()?.get(&id.value()).copied().unwrap_or(0);

            let failed = FailedAction {
                action,
                attempts,
                last_error: last_error.to_string(),
                failed_at: Utc::now(),
            };
            let mut all_failed = self.read_failed()?;
            all_failed.retain(|f| f.action.id != id);
            all_failed.push(failed.clone());
            write_json_atomic(&self.file(FAILED_ACTIONS, "json"), &all_failed)?;

            self.remove_pending_unlocked(id)?;
            Ok(failed)
        })
    }

    async fn list_failed_actions(&self) -> StoreResult<Vec<FailedAction>> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        let mut failed = self.locked(|| self.read_failed())?;
        failed.sort_by_key(|f| f.action.id);
        Ok(failed)
    }

    async fn remove_failed_action(&self, id: ActionId) -> StoreResult<()> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;
        self.locked(|| {
            let mut failed = self.read_failed()?;
            let before = failed.len();
            failed.retain(|f| f.action.id != id);
            if failed.len() != before {
                write_json_atomic(&self.file(FAILED_ACTIONS, "json"), &failed)?;
            }
            Ok(())
        })
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            let mut locks = self.read_locks()?;
            if let Some(existing) = locks.get(name) {
                if !existing.can_be_acquired_by(owner, now) {
                    return Ok(false);
                }
            }

            locks.insert(
                name.to_string(),
                SyncLease {
                    name: name.to_string(),
                    owner: owner.to_string(),
                    expires_at: now + ttl,
                },
            );
            write_json_atomic(&self.file(LOCKS, "json"), &locks)?;
            Ok(true)
        })
    }

    async fn release_lease(&self, name: &str, owner: &str) -> StoreResult<()> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            let mut locks = self.read_locks()?;
            if locks.get(name).is_some_and(|lease| lease.owner == owner) {
                locks.remove(name);
                write_json_atomic(&self.file(LOCKS, "json"), &locks)?;
            }
            Ok(())
        })
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            let files = [
                self.pending_path(),
                self.file(REPLAY_ATTEMPTS, "json"),
                self.file(FAILED_ACTIONS, "json"),
                self.file(MESSAGES, "json"),
                self.file(CacheCollection::UserCache.name(), "json"),
                self.file(CacheCollection::SettingsCache.name(), "json"),
                self.file(LOCKS, "json"),
            ];
            for path in files {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
            Ok(())
        })?;

        tracing::info!("Local store at {} cleared", self.base_path.display());
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.ensure_ready()?;
        let _guard = self.txn.lock().await;

        self.locked(|| {
            let messages = self.read_messages()?;
            Ok(StoreStats {
                pending_actions: read_pending(&self.pending_path())?.len(),
                failed_actions: self.read_failed()?.len(),
                cached_chats: messages.len(),
                cached_messages: messages.values().map(Vec::len).sum(),
                cached_values: self.read_cache(CacheCollection::UserCache)?.len()
                    + self.read_cache(CacheCollection::SettingsCache)?.len(),
            })
        })
    }
}

/// Read a JSON file, falling back to the default value when it does not exist
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> StoreResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Temp file next to `path`, unique to this writer
fn temp_file_for(path: &Path) -> StoreResult<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(NamedTempFile::new_in(dir)?)
}

/// Write a JSON file through a temp file and an atomic rename
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let mut temp = temp_file_for(path)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read the pending-action log.
///
/// A torn final line (a crash in the middle of an append) is skipped: that
/// enqueue never returned to its caller. Corruption anywhere else is an error.
fn read_pending(path: &Path) -> StoreResult<Vec<PendingAction>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let lines: Vec<String> = reader
        .lines()
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let mut actions = Vec::with_capacity(lines.len());
    let last = lines.len().saturating_sub(1);
    for (index, line) in lines.iter().enumerate() {
        match serde_json::from_str::<PendingAction>(line) {
            Ok(action) => actions.push(action),
            Err(e) if index == last => {
                tracing::warn!("Skipping torn pending-action entry: {}", e);
            }
            Err(e) => {
                return Err(StoreError::Serialization(format!(
                    "Failed to parse pending action: {}",
                    e
                )))
            }
        }
    }

    Ok(actions)
}

/// Cut a torn final line off the log so the next append starts on a fresh line
fn truncate_torn_tail(file: &mut File) -> StoreResult<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut contents = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    tracing::warn!(
        "Dropping {} bytes of torn pending-action entry",
        contents.len() - keep
    );
    file.set_len(keep as u64)?;
    Ok(())
}

fn append_pending(path: &Path, action: &PendingAction) -> StoreResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    truncate_torn_tail(&mut file)?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, action)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn rewrite_pending(path: &Path, actions: &[PendingAction]) -> StoreResult<()> {
    let mut temp = temp_file_for(path)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        for action in actions {
            serde_json::to_writer(&mut writer, action)?;
            writeln!(writer)?;
        }
        writer.flush()?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

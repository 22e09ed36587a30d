//! Sync configuration.

use crate::error::{SyncError, SyncResult};
use local_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Offline sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Wait after coming back online before reconciling (in milliseconds)
    pub settle_delay_ms: u64,
    /// Wait before another pass when the remote was unreachable while online
    /// (in milliseconds)
    pub retry_delay_ms: u64,
    /// Failed replays before an action is moved to the failed-actions list
    pub max_attempts: u32,
    /// Lifetime of the cross-tab reconciliation lease (in seconds)
    pub lease_ttl_secs: u64,
    /// Whether to refresh the profile and settings caches after a pass
    pub refresh_cache: bool,
    /// File-backed store location; in-memory when absent
    pub store: Option<StoreConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1500,
            retry_delay_ms: 30_000,
            max_attempts: 5,
            lease_ttl_secs: 60,
            refresh_cache: true,
            store: None,
        }
    }
}

impl SyncConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_lease_ttl(mut self, secs: u64) -> Self {
        self.lease_ttl_secs = secs;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    pub fn without_cache_refresh(mut self) -> Self {
        self.refresh_cache = false;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs as i64)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config("maxAttempts must be at least 1".into()));
        }
        if self.retry_delay_ms == 0 {
            return Err(SyncError::Config("retryDelayMs must be at least 1".into()));
        }
        if self.lease_ttl_secs == 0 {
            return Err(SyncError::Config("leaseTtlSecs must be at least 1".into()));
        }
        Ok(())
    }

    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is an
    /// error.
    pub async fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No sync config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        let config: SyncConfig = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.settle_delay(), Duration::from_millis(1500));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(30));
        assert!(config.refresh_cache);
        assert!(config.store.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::default()
            .with_settle_delay(Duration::from_secs(2))
            .with_max_attempts(3)
            .without_cache_refresh();
        assert_eq!(config.settle_delay_ms, 2000);
        assert_eq!(config.max_attempts, 3);
        assert!(!config.refresh_cache);

        assert!(SyncConfig::default().with_max_attempts(0).validate().is_err());
        assert!(SyncConfig::default()
            .with_retry_delay(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.json");
        std::fs::write(&path, r#"{"maxAttempts": 2, "settleDelayMs": 500}"#).unwrap();

        let config = SyncConfig::load(&path).await.unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.settle_delay_ms, 500);
        assert_eq!(config.lease_ttl_secs, 60);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = SyncConfig::load(temp_dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            SyncConfig::load(&path).await,
            Err(SyncError::Config(_))
        ));
    }
}

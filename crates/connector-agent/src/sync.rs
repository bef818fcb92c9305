//! Propagation of agent-driven key rotation into the durable record
//!
//! The companion agent rotates its registration key in place on the local
//! filesystem. The reconciler copies the rotated files into the Secret so a
//! restarted pod comes back with the current key. The Secret also carries
//! the connector config, which the local store has no slot for; it is
//! preserved across every write.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use connector_common::retry::{retry_with_backoff, RetryConfig};
use connector_common::{Error, Result};
use connector_state::{Persistence, SerializedState, StateKey};

/// Result of one sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Both stores already held the same registration key
    Unchanged,
    /// The durable record was rewritten from the local store
    Updated,
}

/// Failed sync attempt, split by the step that failed.
#[derive(Debug)]
enum SyncError {
    Load(Error),
    Save(Error),
}

impl SyncError {
    /// Loads are always retried; a save is retried only on a transient
    /// error, so a rejected write (e.g. RBAC 403) ends the sync at once.
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::Load(_) => true,
            SyncError::Save(e) => e.is_retryable(),
        }
    }

    fn into_inner(self) -> Error {
        match self {
            SyncError::Load(e) | SyncError::Save(e) => e,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Load(e) => write!(f, "load failed: {}", e),
            SyncError::Save(e) => write!(f, "save failed: {}", e),
        }
    }
}

/// Keeps the durable record in line with the local store.
pub struct Reconciler {
    lock: Mutex<()>,
    fs_persistence: Arc<dyn Persistence>,
    secret_persistence: Arc<dyn Persistence>,
    retry: RetryConfig,
}

impl Reconciler {
    /// Reconcile `fs_persistence` into `secret_persistence` with the
    /// default sync backoff
    pub fn new(
        fs_persistence: Arc<dyn Persistence>,
        secret_persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            lock: Mutex::new(()),
            fs_persistence,
            secret_persistence,
            retry: RetryConfig::sync(),
        }
    }

    /// Override the backoff used by [`Reconciler::sync_with_backoff`]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// One sync attempt.
    ///
    /// Attempts are serialized: a caller arriving while another attempt is
    /// in flight waits for it to finish.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        self.try_sync().await.map_err(SyncError::into_inner)
    }

    /// [`Reconciler::sync_once`] retried with exponential backoff.
    ///
    /// Load failures are retried until the budget is spent; a save failure
    /// that is not [retryable](Error::is_retryable) is returned at once.
    pub async fn sync_with_backoff(&self) -> Result<SyncOutcome> {
        retry_with_backoff(
            &self.retry,
            "sync_secret",
            || self.try_sync(),
            SyncError::is_retryable,
        )
        .await
        .map_err(SyncError::into_inner)
    }

    async fn try_sync(&self) -> std::result::Result<SyncOutcome, SyncError> {
        let _guard = self.lock.lock().await;

        let existing = self
            .secret_persistence
            .load()
            .await
            .map_err(SyncError::Load)?
            .unwrap_or_default();
        let local = self
            .fs_persistence
            .load()
            .await
            .map_err(SyncError::Load)?
            .ok_or_else(|| {
                SyncError::Load(Error::internal_with_context(
                    "sync",
                    "local state is not available",
                ))
            })?;

        if existing.get(StateKey::RegistrationKey).unwrap_or_default()
            == local.get(StateKey::RegistrationKey).unwrap_or_default()
        {
            debug!("Registration key unchanged, skipping Secret update");
            return Ok(SyncOutcome::Unchanged);
        }

        let merged = merge_state(&existing, local);
        self.secret_persistence
            .save(&merged)
            .await
            .map_err(SyncError::Save)?;
        info!("Updated Secret with rotated registration key");
        Ok(SyncOutcome::Updated)
    }
}

/// Local state with the durable record's connector config carried over.
pub fn merge_state(existing: &SerializedState, mut local: SerializedState) -> SerializedState {
    local.insert(
        StateKey::ConnectorConfig,
        existing.get(StateKey::ConnectorConfig).unwrap_or_default(),
    );
    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{api_error, sample_state, MemoryPersistence};
    use std::time::Duration;

    const OLD_CONFIG: &str = r#"{"activationId":"old"}"#;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    /// What the filesystem store loads: no connector config entry
    fn local_view(mut state: SerializedState) -> SerializedState {
        state.remove(StateKey::ConnectorConfig);
        state
    }

    fn durable(instance_id: &str) -> SerializedState {
        let mut state = sample_state("old", instance_id).serialize().unwrap();
        state.insert(StateKey::ConnectorConfig, OLD_CONFIG);
        state
    }

    fn rotated(instance_id: &str) -> SerializedState {
        let mut state = sample_state("old", instance_id);
        state.private_key = "cm90YXRlZCBrZXk=".to_string();
        state.private_key_created_date = "2021-11-05 05:27:47.1 +0000 UTC".to_string();
        local_view(state.serialize().unwrap())
    }

    fn reconciler(fs: &Arc<MemoryPersistence>, secret: &Arc<MemoryPersistence>) -> Reconciler {
        Reconciler::new(fs.clone(), secret.clone()).with_retry(fast_retry())
    }

    #[tokio::test]
    async fn test_unchanged_key_does_not_write() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")));
        let fs = Arc::new(MemoryPersistence::with_state(local_view(durable("mi-1"))));

        let outcome = reconciler(&fs, &secret).sync_once().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert!(secret.saves().is_empty());
    }

    #[tokio::test]
    async fn test_rotated_key_is_written_with_durable_config() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")));
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));

        let outcome = reconciler(&fs, &secret).sync_once().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Updated);
        let saves = secret.saves();
        assert_eq!(saves.len(), 1);
        let local = rotated("mi-1");
        assert_eq!(
            saves[0].get(StateKey::RegistrationKey),
            local.get(StateKey::RegistrationKey)
        );
        assert_eq!(saves[0].get(StateKey::ConnectorConfig), Some(OLD_CONFIG));
    }

    #[tokio::test]
    async fn test_second_sync_is_a_no_op() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")));
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));
        let reconciler = reconciler(&fs, &secret);

        assert_eq!(reconciler.sync_once().await.unwrap(), SyncOutcome::Updated);
        assert_eq!(reconciler.sync_once().await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(secret.saves().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_is_created_from_local() {
        let secret = Arc::new(MemoryPersistence::empty());
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));

        let outcome = reconciler(&fs, &secret).sync_once().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Updated);
        let saved = secret.current().unwrap();
        assert_eq!(saved.get(StateKey::ConnectorConfig), Some(""));
    }

    #[tokio::test]
    async fn test_load_failure_is_retried() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")).fail_loads(2));
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));

        let outcome = reconciler(&fs, &secret).sync_with_backoff().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(secret.saves().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_backoff_returns_error() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")));
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")).fail_loads(10));

        assert!(reconciler(&fs, &secret).sync_with_backoff().await.is_err());
        assert!(secret.saves().is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_is_retried() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")).fail_saves(1));
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));

        let outcome = reconciler(&fs, &secret).sync_with_backoff().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(
            secret.current().unwrap().get(StateKey::ConnectorConfig),
            Some(OLD_CONFIG)
        );
    }

    #[tokio::test]
    async fn test_rejected_save_is_not_retried() {
        let secret = Arc::new(
            MemoryPersistence::with_state(durable("mi-1"))
                .fail_saves(10)
                .failing_with(|| api_error(403)),
        );
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));

        let err = reconciler(&fs, &secret)
            .sync_with_backoff()
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(secret.loads(), 1);
        assert_eq!(secret.current(), Some(durable("mi-1")));
    }

    #[tokio::test]
    async fn test_rejected_load_is_still_retried() {
        let secret = Arc::new(
            MemoryPersistence::with_state(durable("mi-1"))
                .fail_loads(10)
                .failing_with(|| api_error(403)),
        );
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));

        assert!(reconciler(&fs, &secret).sync_with_backoff().await.is_err());
        assert_eq!(secret.loads(), fast_retry().max_attempts);
    }

    #[tokio::test]
    async fn test_concurrent_syncs_write_once() {
        let secret = Arc::new(MemoryPersistence::with_state(durable("mi-1")));
        let fs = Arc::new(MemoryPersistence::with_state(rotated("mi-1")));
        let reconciler = Arc::new(reconciler(&fs, &secret));

        let a = tokio::spawn({
            let r = reconciler.clone();
            async move { r.sync_once().await }
        });
        let b = tokio::spawn({
            let r = reconciler.clone();
            async move { r.sync_once().await }
        });
        let mut outcomes = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        outcomes.sort_by_key(|o| *o == SyncOutcome::Updated);

        assert_eq!(outcomes, vec![SyncOutcome::Unchanged, SyncOutcome::Updated]);
        assert_eq!(secret.saves().len(), 1);
    }

    #[test]
    fn test_merge_keeps_local_entries() {
        let merged = merge_state(&durable("mi-1"), rotated("mi-2"));
        let local = rotated("mi-2");

        for key in [
            StateKey::Manifest,
            StateKey::RegistrationKey,
            StateKey::InstanceFingerprint,
        ] {
            assert_eq!(merged.get(key), local.get(key));
        }
        assert_eq!(merged.get(StateKey::ConnectorConfig), Some(OLD_CONFIG));
    }
}

//! Sync run configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use eyre::{eyre, Result};

/// Tunables of one backfill run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Concurrent sync jobs.
    pub workers: usize,
    /// Blocks per job.
    pub range_size: u64,
    /// Calls per RPC batch chunk.
    pub step: usize,
    /// Deadline of a single batch chunk.
    pub batch_timeout: Duration,
    /// Re-sends of a chunk after transport failures.
    pub batch_retries: u32,
    /// First backoff between re-sends; doubles per attempt.
    pub retry_backoff: Duration,
    /// Produce log and NFT transfer records.
    pub decode_logs: bool,
    /// Skip ranges whose blocks are all stored already.
    pub skip_existing: bool,
    /// Queue bound of the worker pool; `None` queues every range up front.
    pub queue_capacity: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            workers: 32,
            range_size: 100,
            step: 1000,
            batch_timeout: Duration::from_secs(30),
            batch_retries: 0,
            retry_backoff: Duration::from_millis(500),
            decode_logs: true,
            skip_existing: false,
            queue_capacity: None,
        }
    }
}

impl SyncConfig {
    /// # Errors
    /// Returns error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(eyre!("rpc url is required"));
        }
        if self.workers == 0 {
            return Err(eyre!("workers must be at least 1"));
        }
        if self.range_size == 0 {
            return Err(eyre!("range size must be at least 1"));
        }
        if self.step == 0 {
            return Err(eyre!("step (batch chunk size) must be at least 1"));
        }
        if self.batch_timeout.is_zero() {
            return Err(eyre!("batch timeout must be positive"));
        }
        if self.queue_capacity == Some(0) {
            return Err(eyre!("queue capacity must be at least 1 when set"));
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.step).ok_or_else(|| eyre!("step must be at least 1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyncConfig {
        SyncConfig {
            rpc_url: "http://localhost:8545".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_valid_once_url_set() {
        assert!(config().validate().is_ok());
        assert!(SyncConfig::default().validate().is_err());
    }

    #[test]
    fn rejects_zero_settings() {
        for broken in [
            SyncConfig { workers: 0, ..config() },
            SyncConfig { range_size: 0, ..config() },
            SyncConfig { step: 0, ..config() },
            SyncConfig { batch_timeout: Duration::ZERO, ..config() },
            SyncConfig { queue_capacity: Some(0), ..config() },
        ] {
            assert!(broken.validate().is_err(), "{broken:?} should be rejected");
        }
    }
}

//! Processor configuration.

use std::time::Duration;

use notenav_core::defaults;

use crate::retry::RetryPolicy;

/// Configuration for a content processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Jobs taken from the queue per batch.
    pub batch_size: usize,
    /// Jobs in flight at once within a batch.
    pub parallel_limit: usize,
    /// Quiet period between enqueue and processing start.
    pub debounce: Duration,
    /// Backoff for failed files.
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::CONTENT_BATCH_SIZE,
            parallel_limit: defaults::CONTENT_PARALLEL_LIMIT,
            debounce: Duration::from_millis(defaults::CONTENT_DEBOUNCE_MS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CONTENT_BATCH_SIZE` | `100` | Jobs per batch |
    /// | `CONTENT_PARALLEL_LIMIT` | `10` | Concurrent jobs per chunk |
    /// | `CONTENT_DEBOUNCE_MS` | `100` | Debounce before a batch starts |
    pub fn from_env() -> Self {
        let batch_size = std::env::var("CONTENT_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::CONTENT_BATCH_SIZE)
            .max(1);

        let parallel_limit = std::env::var("CONTENT_PARALLEL_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::CONTENT_PARALLEL_LIMIT)
            .max(1);

        let debounce_ms = std::env::var("CONTENT_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::CONTENT_DEBOUNCE_MS);

        Self {
            batch_size,
            parallel_limit,
            debounce: Duration::from_millis(debounce_ms),
            retry: RetryPolicy::default(),
        }
    }

    /// Set jobs per batch.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set concurrent jobs per chunk.
    pub fn with_parallel_limit(mut self, limit: usize) -> Self {
        self.parallel_limit = limit.max(1);
        self
    }

    /// Set the debounce period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

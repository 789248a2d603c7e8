//! Engine tuning knobs.

use std::time::Duration;

/// Limits applied by the batch verification engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum simultaneous item verifications per job (default: 8)
    pub max_concurrency: usize,
    /// Upper bound on each external call made for one image (default: 30s)
    pub item_timeout: Duration,
    /// Maximum number of image ids accepted in one batch (default: 10000)
    pub max_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            item_timeout: Duration::from_secs(30),
            max_batch_size: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load from `BATCH_MAX_CONCURRENCY`, `BATCH_ITEM_TIMEOUT_SECS` and `BATCH_MAX_SIZE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrency = std::env::var("BATCH_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_concurrency);

        let item_timeout = std::env::var("BATCH_ITEM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|s: &u64| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.item_timeout);

        let max_batch_size = std::env::var("BATCH_MAX_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_batch_size);

        Self {
            max_concurrency,
            item_timeout,
            max_batch_size,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_item_timeout(mut self, item_timeout: Duration) -> Self {
        self.item_timeout = item_timeout;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
}

//! Scorer configuration.

use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds on how long the scorer waits for its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorerConfig {
    /// Limit on any single store call.
    pub store_timeout: Duration,
    /// Limit on waiting for another operation on the same innings to finish.
    pub lock_timeout: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_TIMEOUT,
            lock_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ScorerConfig {
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

//! Retry policy: how often to retry a command and how long to wait.

use std::time::Duration;

/// Bounded retry with exponential backoff (no jitter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `retries + 1`.
    pub retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    /// Run once, never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Uploads: 3 retries starting at 2s.
    pub fn upload() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Listings and deletions: 2 retries starting at 1s.
    pub fn remote_metadata() -> Self {
        Self::new(2, Duration::from_secs(1))
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay between attempt `attempt` and `attempt + 1` (0-indexed).
    ///
    /// delay = base_delay * 2^attempt
    ///
    /// Example with base_delay=2s:
    /// - after attempt 0: 2s
    /// - after attempt 1: 4s
    /// - after attempt 2: 8s
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

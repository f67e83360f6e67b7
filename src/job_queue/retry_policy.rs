//! Retry delays for failed jobs.
//!
//! Exponential backoff: `base_interval_ms * min(max_backoff_factor, 2^failure_count)`.

use crate::config::JobQueueSettings;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay unit, in milliseconds.
    pub base_interval_ms: u64,
    /// Cap on the exponential factor.
    pub max_backoff_factor: u64,
}

impl RetryPolicy {
    pub fn new(settings: &JobQueueSettings) -> Self {
        Self {
            base_interval_ms: settings.retry_base_interval_ms,
            max_backoff_factor: settings.max_backoff_factor,
        }
    }

    /// Delay before re-running a job that has failed `failure_count` times.
    pub fn backoff(&self, failure_count: u32) -> Duration {
        // 2^63 is already past any sensible cap
        let exponential = 1u64.checked_shl(failure_count.min(63)).unwrap_or(u64::MAX);
        let factor = exponential.min(self.max_backoff_factor);
        Duration::from_millis(self.base_interval_ms.saturating_mul(factor))
    }

    /// Upper bound of [`RetryPolicy::backoff`].
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms.saturating_mul(self.max_backoff_factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_interval_ms: 250,
            max_backoff_factor: 600,
        }
    }
}

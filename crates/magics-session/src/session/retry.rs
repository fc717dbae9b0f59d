//! Bounded exponential backoff for transient failures.

use std::time::Duration;

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// Builds a policy making at most `attempts` attempts, never fewer than one.
    #[must_use]
    pub const fn new(attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            initial_backoff,
        }
    }

    /// Total attempts made before a transient failure is surfaced.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Delay after the `attempt`-th failure, doubling from the initial backoff.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            magics_config::DEFAULT_RETRY_ATTEMPTS,
            magics_config::default_retry_backoff(),
        )
    }
}

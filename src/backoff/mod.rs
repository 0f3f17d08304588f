//! Backoff Strategies
//!
//! Pure, attempt-indexed retry policies shared by the client poll loop and
//! the retry interceptor. A strategy is stateless: given the same attempt
//! number it always answers the same, so one instance is safely shared
//! across concurrent callers. `total_time` (the sum of every possible delay)
//! is what the client uses to stamp a request's expiry.

use std::time::Duration;

/// Attempt-indexed retry policy. Attempts are 1-based.
pub trait BackoffStrategy: Send + Sync {
    /// Whether `attempt` is still within the budget.
    fn can_retry(&self, attempt: u32) -> bool;

    /// The delay to wait before (re-)trying `attempt`.
    fn delay_time(&self, attempt: u32) -> Duration;

    /// Sum of all possible delays; the worst-case wall-clock budget.
    fn total_time(&self) -> Duration {
        let mut total = Duration::ZERO;
        let mut attempt = 1;
        while self.can_retry(attempt) {
            total += self.delay_time(attempt);
            attempt += 1;
        }
        total
    }
}

/// Fixed interval between attempts.
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ConstantBackoff {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn can_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    fn delay_time(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Delay grows by `factor` with every attempt.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, factor: u32, max_attempts: u32) -> Self {
        Self {
            initial,
            factor,
            max_attempts,
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn can_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    fn delay_time(&self, attempt: u32) -> Duration {
        self.initial * self.factor.saturating_pow(attempt.saturating_sub(1))
    }
}

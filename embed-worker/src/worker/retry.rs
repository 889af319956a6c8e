//! Bounded exponential backoff for retryable engine failures.

use std::time::Duration;

use rand::Rng;

use crate::config::WorkerConfig;

/// Fraction of the backoff added or removed at random.
const JITTER: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            base,
            max: max.max(base),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
            Duration::from_millis(config.retry_backoff_max_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a task that failed on `attempt` (zero-based) may run again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before running `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .checked_mul(2u32.saturating_pow(attempt.min(31)))
            .unwrap_or(self.max)
            .min(self.max);

        if exp.is_zero() {
            return exp;
        }

        let factor = rand::thread_rng().gen_range((1.0 - JITTER)..=(1.0 + JITTER));
        exp.mul_f64(factor)
    }
}

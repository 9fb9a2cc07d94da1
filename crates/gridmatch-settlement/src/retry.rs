//! Bounded exponential backoff with jitter.
//!
//! Every ledger-facing retry loop in this crate goes through
//! [`RetryPolicy`]: metric reads, hour ticks and (via
//! [`RetryPolicy::delay_for`]) the batch submitter's commit loop. Only
//! errors whose class is `Transient` are retried.

use std::future::Future;
use std::time::Duration;

use gridmatch_types::{GridmatchError, Result, RetryConfig};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (0-based): `initial * multiplier^retry`,
    /// capped at `max_backoff`, then spread by `±jitter`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.config.initial_backoff_ms as f64
            * self.config.multiplier.powi(retry.min(63) as i32);
        let capped = base.min(self.config.max_backoff_ms as f64);

        let jitter_range = capped * self.config.jitter;
        let jitter = if jitter_range > 0.0 {
            (rand::random::<f64>() - 0.5) * jitter_range * 2.0
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. Returns the last error on exhaustion.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max = self.max_attempts();
        let mut last_error = None;

        for attempt in 1..=max {
            if attempt > 1 {
                let delay = self.delay_for(attempt - 2);
                tokio::time::sleep(delay).await;
            }
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(operation = operation_name, attempt, max, error = %e, "Attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GridmatchError::Internal(format!("{operation_name}: no attempts were made"))
        }))
    }
}

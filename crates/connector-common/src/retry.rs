//! Retry utilities with exponential backoff.
//!
//! Used by the reconciler to retry a sync attempt against the local and
//! durable stores until it succeeds, hits a permanent error, or the attempt
//! budget is exhausted.
//!
//! # Example
//!
//! ```ignore
//! use connector_common::retry::{retry_with_backoff, RetryConfig};
//!
//! retry_with_backoff(
//!     &RetryConfig::sync(),
//!     "sync_secret",
//!     || async { reconciler.sync_once().await },
//!     |e: &Error| e.is_retryable(),
//! )
//! .await?;
//! ```

use std::time::Duration;

use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Budget for one state sync: 7 attempts, 1s initial delay doubling
    /// each time. That is 63s of sleeping; with slow API calls an exhausted
    /// sync takes up to about two minutes.
    pub fn sync() -> Self {
        Self {
            max_attempts: 7,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            backoff_multiplier: 2.0,
        }
    }

    /// Delay before the retry following attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(
            (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute an async operation with exponential backoff until it succeeds,
/// fails with an error `should_retry` rejects, or `max_attempts` is reached.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging purposes
/// * `operation` - The async operation to retry
/// * `should_retry` - Whether an error is worth another attempt
///
/// # Returns
/// The result of the operation, or the last error.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed with permanent error"
                    );
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = config.delay_after(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

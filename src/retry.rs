//! Retry logic with exponential backoff
//!
//! The worker treats one fetch as a single logical unit of work; transient
//! engine failures are retried here, inside the unit, with exponential
//! backoff and optional jitter. Permanent failures (private media, size
//! limits, cancellation) fail immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset)
/// should return `true`. Permanent failures (unavailable media, exceeded
/// limits, cancellation) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // Network failures are the canonical transient case
            FetchError::Network(_) => true,
            // Engine errors are classified by message content
            FetchError::Engine(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("temporar")
                    || msg.contains("503")
                    || msg.contains("429")
            }
            // Private/removed/copyright-blocked media never recovers
            FetchError::Unavailable(_) => false,
            // Admission limits require a different request, not a retry
            FetchError::TooLarge { .. } | FetchError::TooLong { .. } => false,
            // Cancellation is a decision, not a failure
            FetchError::Cancelled => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic.
///
/// Returns the successful result, or the last error once a non-retryable
/// error occurs or `config.max_attempts` retries are exhausted.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Fetch succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Fetch failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Fetch failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Fetch failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to avoid synchronized retries.
///
/// The jittered delay is uniformly distributed between `delay` and
/// `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

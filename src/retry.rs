//! Retry logic with exponential backoff
//!
//! Every remote call made by the apply pipeline goes through [`with_retry`] or
//! [`with_retry_progress`]. Failures are classified through [`IsRetryable`]: an
//! HTTP 400 is a permanent client error and is returned at once, other remote
//! failures are retried with exponential backoff until the attempt budget runs out.
//!
//! # Example
//!
//! ```no_run
//! use translation_apply::retry::with_retry;
//! use translation_apply::config::RetryConfig;
//! use translation_apply::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let value = with_retry(&config, || async {
//!     // Your remote call here
//!     Ok::<_, Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use crate::progress::ProgressContext;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Bad request - not caused by rate limiting or an intermittent failure
            Error::Api { status, .. } => *status != 400,
            Error::Network(e) => e.status().is_none_or(|s| s.as_u16() != 400),
            Error::NotFound(_) | Error::Other(_) => true,
            Error::TaskFailed { source, .. } => source.is_retryable(),
            // Stale versions are re-fetched by the caller, local failures are deterministic
            Error::VersionConflict { .. }
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::CyclicDependency { .. }
            | Error::ProgressOverflow
            | Error::InvalidPath(_)
            | Error::InvalidPayload(_)
            | Error::LocalizationPending { .. } => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `config.max_attempts` times. Between attempts the
/// delay starts at `initial_delay` and is multiplied by `backoff_multiplier`,
/// capped at `max_delay`. Non-retryable errors are returned after the first call.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    run_with_retry(config, None, operation).await
}

/// Like [`with_retry`], recording the attempt number on a progress context
///
/// The attempt about to run (`2..=max_attempts`) is stored as the context's retry
/// number so observers can show "retrying (n/5)"; it is cleared on success.
pub async fn with_retry_progress<F, Fut, T, E>(
    config: &RetryConfig,
    progress: Option<&ProgressContext>,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    run_with_retry(config, progress, operation).await
}

async fn run_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    progress: Option<&ProgressContext>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                    if let Some(progress) = progress {
                        progress.set_retry(None);
                    }
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                attempt += 1;
                if let Some(progress) = progress {
                    progress.set_retry(Some(attempt));
                }

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

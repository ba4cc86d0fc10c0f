//! Retry logic with fixed or exponential backoff
//!
//! Two layers of the sync use this module: the redirect resolver retries single
//! requests with exponential backoff, and the per-record processor retries whole
//! resolutions with a fixed delay.
//!
//! # Example
//!
//! ```no_run
//! use picsync::retry::{IsRetryable, RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "transient")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
//! retry_with_policy(&policy, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, ResolveError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (bad status, missing header, timeouts, connection errors) return `true`.
/// Cancellation and local failures (database, configuration) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ResolveError {
    fn is_retryable(&self) -> bool {
        // Every resolution failure is treated as transient
        true
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Resolve(e) => e.is_retryable(),
            Error::Timeout { .. } => true,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // A cancelled sync must stop, never retry
            Error::Cancelled => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::SyncFailed { .. } | Error::AllRecordsFailed { .. } => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// How the delay grows between attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles with every retry
    Exponential,
}

/// Bounded retry schedule
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Extra attempts after the first one (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Growth of the delay between retries
    pub backoff: Backoff,
    /// Add up to 100% random extra delay
    pub jitter: bool,
}

impl RetryPolicy {
    /// Exponential schedule: retry `k` waits `base_delay * 2^k`
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: base_delay,
            backoff: Backoff::Exponential,
            jitter: false,
        }
    }

    /// Fixed schedule: every retry waits `delay`
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry `retry_index` (0-based), without jitter
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(retry_index);
                self.initial_delay.saturating_mul(factor)
            }
        }
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Execute an async operation, retrying retryable errors according to `policy`
///
/// Returns the successful result or the last error after all attempts are exhausted.
/// Non-retryable errors are returned immediately.
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::debug!(attempts = retries + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                let delay = policy.delay_for(retries);
                let delay = if policy.jitter { add_jitter(delay) } else { delay };
                retries += 1;

                tracing::warn!(
                    error = %e,
                    attempt = retries,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(
                        error = %e,
                        attempts = retries + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

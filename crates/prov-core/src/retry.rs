//! Bounded retry and timeout combinators
//!
//! Every wait the engine performs goes through [`bounded`]; every operation
//! that may lose a race with the page goes through [`retry_with_backoff`].

use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause after the first failed attempt
    pub initial_backoff_ms: u64,
    /// Growth factor applied to each subsequent pause
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, multiplier: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            multiplier,
        }
    }

    /// Single attempt, no backoff
    #[inline]
    #[must_use]
    pub fn once() -> Self {
        Self::new(1, 0, 1)
    }

    /// Pause to take after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exponent);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500, 2)
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: E,
    },
    /// An attempt failed with a non-retryable error
    Fatal(E),
}

impl<E> RetryError<E> {
    /// Underlying error, discarding the attempt count
    #[inline]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } | Self::Fatal(last) => last,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the policy is exhausted
///
/// `op` receives the 1-based attempt number. Errors for which `is_retryable`
/// returns `false` end the loop immediately.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
            Err(e) if attempt >= attempts => {
                tracing::warn!("{} failed after {} attempts: {}", operation, attempt, e);
                return Err(RetryError::Exhausted { attempts: attempt, last: e });
            }
            Err(e) => {
                let pause = policy.backoff_for(attempt);
                tracing::warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    operation,
                    attempt,
                    attempts,
                    e,
                    pause
                );
                tokio::time::sleep(pause).await;
                attempt += 1;
            }
        }
    }
}

/// Apply a timeout to a driver operation
///
/// Expiry is reported as [`DriverError::Timeout`] naming `target`.
pub async fn bounded<T, F>(limit: Duration, target: &str, fut: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout {
            target: target.to_string(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

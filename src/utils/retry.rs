//! Retry utilities for resilient operations
//!
//! This module provides a bounded retry mechanism with a fixed delay between
//! attempts. The delay is realized through a [`Clock`] so that tests can run
//! the full retry schedule instantly and assert the exact sleeps taken.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Source of delays between retry attempts
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that returns immediately and remembers every requested sleep
#[derive(Debug, Clone, Default)]
pub struct RecordingClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of all requested sleeps
    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a fixed delay
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Policy used for service registration: 5 attempts, 5 seconds apart
    pub fn registration() -> Self {
        Self::fixed(5, Duration::from_secs(5))
    }

    /// Worst-case time spent sleeping when every attempt fails
    pub fn total_delay(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

/// All attempts failed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("operation failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E: Display> {
    pub attempts: u32,
    pub last_error: E,
}

/// Execute an operation until it succeeds or the policy is exhausted
///
/// Attempts run serially: the next attempt starts only after the previous
/// one failed and the delay elapsed on `clock`.
///
/// # Example
///
/// ```no_run
/// use netmend::utils::retry::{with_retry, RetryPolicy, TokioClock};
/// use std::time::Duration;
///
/// # async fn run() {
/// let policy = RetryPolicy::fixed(3, Duration::from_millis(100));
/// let result = with_retry(&policy, &TokioClock, || async {
///     Ok::<_, String>("data")
/// })
/// .await;
/// assert!(result.is_ok());
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    clock: &C,
    operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: Clock + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "Operation failed, giving up"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                clock.sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

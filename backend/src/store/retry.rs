//! Bounded retry with exponential backoff
//!
//! Only transient failures (lock acquisition timeouts surfaced as
//! `ConcurrentModification`) are retried. Validation failures are returned
//! on the first attempt.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether a retry could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry settings
///
/// # Example
/// ```
/// use btz_ledger_core::store::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.backoff_for(1), Duration::from_millis(5));
/// assert_eq!(policy.backoff_for(2), Duration::from_millis(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub initial_backoff_ms: u64,
    /// Upper bound for any single wait
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before retrying after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

// src/utils/retry.rs
//! Exponential backoff for ledger calls.
//!
//! The registration and verification workflows never retry on their own; a
//! caller opts in by wrapping a ledger call with [`with_backoff`]. Only
//! [`LedgerError::Unavailable`] is retried. A rejected write fails the same
//! way every time until the batch changes.

use crate::error::LedgerError;
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget runs out. The last error is returned unchanged.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "attempt {}/{} failed ({}), retrying in {:?}",
                    attempt, policy.max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

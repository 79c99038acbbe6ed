//! Retry with exponential backoff
//!
//! [`RetryPolicy::run`] wraps a single store call at its call site. Only errors
//! the caller's predicate marks as transient are retried; everything else is
//! returned on the first failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound on a single wait between attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            backoff_multiplier,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut, P>(&self, operation: &str, is_transient: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", operation, attempt, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if is_transient(&e) && attempt < attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:.1}s...",
                        operation,
                        attempt,
                        attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if is_transient(&e) {
                        warn!("{} failed after {} attempts: {}", operation, attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

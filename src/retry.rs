//! Reusable retry policy for calls to external services.
//!
//! One policy object describes attempts and wait; callers decide which errors
//! are worth retrying.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub wait: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, wait: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
            backoff,
        }
    }

    /// A policy that makes a single attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Backoff::Fixed)
    }

    /// Delay before attempt `attempt` (1-based). The first attempt never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Fixed => self.wait,
            // 1x, 2x, 4x, ... capped at 32x
            Backoff::Exponential => self.wait * (1u32 << (attempt - 2).min(5)),
        }
    }

    /// Runs `op` until it succeeds, returns a non-retryable error, or the
    /// attempts are exhausted. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Backoff::Fixed)
    }
}

//! Bounded retry with backoff for single adapter calls
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Success | Return the value |
//! | Non-retryable error (unsupported, cancelled) | Return immediately |
//! | Retryable error, retries left | Sleep, then try again |
//! | Retryable error, retries exhausted | Return the last error |
//!
//! A call makes at most `1 + max_retries` attempts. Waits are interrupted by
//! the run's cancellation token.

use crate::adapter::AdapterError;
use crate::config::{Backoff, CrawlerConfig};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry/backoff settings for adapter calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            backoff: config.backoff,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out
    ///
    /// `label` names the call in log lines. A server-provided `Retry-After`
    /// replaces the computed delay when longer, still bounded by `max_delay`.
    pub async fn call<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let mut retry = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled);
            }

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if retry >= self.max_retries {
                tracing::warn!(
                    "{} failed after {} attempt(s): {}",
                    label,
                    retry + 1,
                    error
                );
                return Err(error);
            }

            let delay = match error.retry_after() {
                Some(wait) => wait.max(self.delay_for(retry)).min(self.max_delay),
                None => self.delay_for(retry),
            };

            tracing::warn!(
                "{} failed (attempt {}/{}): {}; retrying in {:?}",
                label,
                retry + 1,
                self.max_retries + 1,
                error,
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            retry += 1;
        }
    }
}

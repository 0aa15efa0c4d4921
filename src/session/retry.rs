//! Bounded retry with backoff for remote calls

use crate::core::config::SessionConfig;
use crate::core::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same wait before every retry
    Fixed(Duration),
    /// base, 2*base, 3*base, ...
    Linear(Duration),
    /// base, 2*base, 4*base, ... (exponent capped at 8)
    Exponential(Duration),
}

impl Backoff {
    /// Wait before retry number `retry` (1-indexed)
    pub fn delay(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match *self {
            Backoff::Fixed(base) => base,
            Backoff::Linear(base) => base.saturating_mul(retry),
            Backoff::Exponential(base) => {
                let exponent = (retry - 1).min(8);
                base.saturating_mul(2u32.pow(exponent))
            }
        }
    }
}

/// Which failures a policy retries, how often, and how long it waits
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retry_on: fn(&ApiError) -> bool,
}

fn retry_unless_not_found(err: &ApiError) -> bool {
    !err.is_not_found()
}

fn retry_timeouts(err: &ApiError) -> bool {
    err.is_timeout()
}

impl RetryPolicy {
    /// Retries transient (network and timeout) failures only
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retry_on: ApiError::is_transient,
        }
    }

    pub fn retrying(mut self, retry_on: fn(&ApiError) -> bool) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Create and reset: everything except 404 is retried, waits grow linearly
    pub fn for_create(config: &SessionConfig) -> Self {
        Self::new(config.max_retries + 1, Backoff::Linear(config.retry_base()))
            .retrying(retry_unless_not_found)
    }

    /// Start: transient failures retried with exponential waits
    pub fn for_start(config: &SessionConfig) -> Self {
        Self::new(
            config.max_retries + 1,
            Backoff::Exponential(config.retry_base()),
        )
    }

    /// Stop: a single retry, and only after a timeout
    pub fn for_stop(config: &SessionConfig) -> Self {
        Self::new(2, Backoff::Fixed(config.timeout_retry())).retrying(retry_timeouts)
    }

    /// Step: timeouts retried up to the configured bound
    pub fn for_step(config: &SessionConfig) -> Self {
        Self::new(config.max_retries + 1, Backoff::Fixed(config.timeout_retry()))
            .retrying(retry_timeouts)
    }

    /// Speed changes: timeouts retried with a short fixed wait
    pub fn for_speed(config: &SessionConfig) -> Self {
        Self::new(config.max_retries + 1, Backoff::Fixed(config.retry_base()))
            .retrying(retry_timeouts)
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out
    ///
    /// The closure receives the 1-indexed attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = (self.retry_on)(&err);
                    if !retryable || attempt >= self.max_attempts {
                        if retryable {
                            warn!(operation = label, attempt, error = %err, "retries exhausted");
                        }
                        return Err(err);
                    }
                    let delay = self.backoff.delay(attempt);
                    debug!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

//! Retry policy for calls to external backends
//!
//! Every network collaborator (embedding, search, rerank, generation) is
//! wrapped in a `RetryPolicy`. Transport failures are retried with capped
//! exponential backoff; contract violations surface immediately.

use crate::errors::{AppError, Result};
use crate::metrics;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt ceiling and default delays
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Policy that retries without sleeping (tests, local tooling)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::immediate(1)
    }

    fn backoff(&self) -> backoff::ExponentialBackoff {
        let jitter = if self.initial_delay.is_zero() { 0.0 } else { 0.25 };

        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(jitter)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, or the
    /// attempt ceiling is reached. The last error is returned unmodified.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempts = AtomicU32::new(0);

        backoff::future::retry_notify(
            self.backoff(),
            || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                let fut = operation();
                async move {
                    fut.await.map_err(|err| {
                        if err.is_retryable() && attempt < max_attempts {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: AppError, delay: Duration| {
                metrics::record_retry(operation_name);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempts.load(Ordering::Relaxed),
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Backend call failed, retrying"
                );
            },
        )
        .await
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic async retry with capped exponential backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How an error relates to the retry machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth another attempt within the policy bounds.
    Retryable,
    /// Propagate immediately.
    NonRetryable,
}

/// Classification hook implemented by error types passed to [`retry`].
pub trait Classify {
    fn class(&self) -> RetryClass;
}

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type RetryObserver<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Retry policy. Between attempts sleeps
/// `min(max_delay, base_delay * backoff_factor^attempt)` with `attempt`
/// 1-based.
pub struct RetryPolicy<E> {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Narrows the retryable surface beyond [`Classify`]; an error retries
    /// only when classified retryable AND this predicate (if set) accepts it.
    should_retry: Option<RetryPredicate<E>>,
    /// Observability callback invoked before each sleep with (error, attempt).
    on_retry: Option<RetryObserver<E>>,
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            should_retry: None,
            on_retry: None,
        }
    }
}

impl<E> RetryPolicy<E> {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, ..Self::default() }
    }

    pub fn max_delay(mut self, v: Duration) -> Self {
        self.max_delay = v;
        self
    }

    pub fn backoff_factor(mut self, v: f64) -> Self {
        self.backoff_factor = v;
        self
    }

    /// Linear backoff: every delay equals `base_delay`.
    pub fn linear(mut self) -> Self {
        self.backoff_factor = 1.0;
        self
    }

    pub fn should_retry(mut self, pred: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(pred));
        self
    }

    pub fn on_retry(mut self, observer: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Delay before the attempt following failed attempt `attempt` — the
    /// same 1-based counter the `on_retry` observer receives.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn retries(&self, err: &E) -> bool
    where
        E: Classify,
    {
        if err.class() != RetryClass::Retryable {
            return false;
        }
        match &self.should_retry {
            Some(pred) => pred(err),
            None => true,
        }
    }
}

/// Run `op` up to `policy.max_attempts` times. The closure receives the
/// 1-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy<E>, mut op: F) -> Result<T, E>
where
    E: Classify,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && policy.retries(&err) => {
                if let Some(observer) = &policy.on_retry {
                    observer(&err, attempt);
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

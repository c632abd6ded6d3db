// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker shielding callers from a failing dependency.

use std::future::Future;
use std::time::{Duration, Instant};

use fm_core::metrics::BreakerCounters;
use parking_lot::Mutex;
use thiserror::Error;

/// Breaker tuning. Defaults follow the operational profile of external
/// LLM providers: trip after 5 consecutive failures, recover after 2
/// half-open successes.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Per-call budget; each call races against this.
    pub call_timeout: Duration,
    /// How long an open breaker rejects before probing half-open.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            call_timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

fm_core::simple_display! {
    BreakerState {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half_open",
    }
}

/// Error surface of a breaker-wrapped call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without touching the dependency. Callers treat this as
    /// transient; the breaker will probe again after its reset timeout.
    #[error("circuit open: {name}")]
    Open { name: String },
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Inner(E),
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    next_retry: Option<Instant>,
}

/// Failure-isolation state machine: closed → open → half-open → closed.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    counters: Mutex<BreakerCounters>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                next_retry: None,
            }),
            counters: Mutex::new(BreakerCounters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn counters(&self) -> BreakerCounters {
        *self.counters.lock()
    }

    /// Execute `fut` under the breaker, racing it against the call timeout.
    pub async fn call<T, E, Fut>(&self, fut: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        let result = tokio::time::timeout(self.config.call_timeout, fut).await;
        match result {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                self.record_failure();
                Err(BreakerError::Timeout(self.config.call_timeout))
            }
        }
    }

    /// Gate a call attempt: rejects while open, transitions to half-open
    /// once the reset timeout has elapsed.
    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::Open {
            let due = inner.next_retry.map(|at| Instant::now() >= at).unwrap_or(true);
            if due {
                inner.state = BreakerState::HalfOpen;
                inner.consecutive_successes = 0;
                tracing::info!(breaker = %self.name, "half-open, probing");
            } else {
                self.counters.lock().rejected += 1;
                return Err(BreakerError::Open { name: self.name.clone() });
            }
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.counters.lock().success += 1;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.next_retry = None;
                    self.counters.lock().closed += 1;
                    tracing::info!(breaker = %self.name, "closed");
                }
            }
            _ => {
                inner.consecutive_failures = 0;
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.counters.lock().failure += 1;
        match inner.state {
            // Any half-open failure reopens immediately
            BreakerState::HalfOpen => self.trip(&mut inner),
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = BreakerState::Open;
        inner.consecutive_successes = 0;
        inner.next_retry = Some(Instant::now() + self.config.reset_timeout);
        self.counters.lock().opened += 1;
        tracing::warn!(
            breaker = %self.name,
            reset_ms = self.config.reset_timeout.as_millis() as u64,
            "opened"
        );
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;

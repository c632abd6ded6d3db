// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async mutex with acquisition timeout.
//!
//! Serialises operations that cannot be expressed as a store-level
//! compare-and-swap (e.g. lazy resource initialisation). Waiters are
//! served in FIFO order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Deadline expired before the lock was granted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("lock acquisition timed out after {0:?}")]
pub struct AcquireTimeout(pub Duration);

/// FIFO-fair async mutex. `tokio::sync::Mutex` queues waiters in arrival
/// order, which is the fairness invariant callers rely on.
#[derive(Clone, Default)]
pub struct TimedMutex {
    inner: Arc<Mutex<()>>,
}

impl TimedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock; the returned guard releases on drop.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.inner.clone().lock_owned().await
    }

    /// Acquire with a deadline.
    pub async fn acquire_timeout(&self, dur: Duration) -> Result<OwnedMutexGuard<()>, AcquireTimeout> {
        tokio::time::timeout(dur, self.inner.clone().lock_owned())
            .await
            .map_err(|_| AcquireTimeout(dur))
    }

    /// Acquire, run `op`, release on all exit paths (including failure —
    /// the guard drops when the future resolves or is cancelled).
    pub async fn run_exclusive<T, F>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire().await;
        op.await
    }
}

#[cfg(test)]
#[path = "mutex_tests.rs"]
mod tests;

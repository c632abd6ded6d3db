// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout wrapper shared by the router and runner.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Deadline exceeded.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Race `fut` against `dur`.
pub async fn timeout<F: Future>(dur: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(dur, fut).await.map_err(|_| Elapsed(dur))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_futures() {
        let out = timeout(Duration::from_millis(50), async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn cuts_off_slow_futures() {
        let dur = Duration::from_millis(10);
        let out = timeout(dur, tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(out.unwrap_err(), Elapsed(dur));
    }
}

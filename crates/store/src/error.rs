// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error surface shared by all drivers.

use fm_core::{GateId, RunId, StepId};
use thiserror::Error;

/// Errors from the persistence layer.
///
/// Transient connection problems surface as [`StoreError::Unavailable`]
/// and are retryable. Idempotency-key conflicts are NOT errors: drivers
/// report them as `Ok(None)` from `create_step`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("step not found: {0}")]
    StepNotFound(StepId),

    #[error("gate not found: {0}")]
    GateNotFound(GateId),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Transient; callers may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The driver returned a row the domain model cannot read.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::Corrupt("row vanished mid-query".to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

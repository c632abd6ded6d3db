// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error surface.

use fm_core::{GateId, RunId, StepId, StepStatus};
use fm_queue::QueueError;
use fm_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("step not found: {0}")]
    StepNotFound(StepId),

    #[error("gate not found: {0}")]
    GateNotFound(GateId),

    /// Only failed or cancelled steps may be retried.
    #[error("step {id} is not retryable from status {status}")]
    StepNotRetryable { id: StepId, status: StepStatus },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

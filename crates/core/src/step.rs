// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step record and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::id::{RunId, StepId};

/// Status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Enqueued, waiting for a worker lease
    Queued,
    /// Leased by a worker
    Running,
    /// Blocked on a pending gate
    AwaitingGate,
    /// Completed successfully
    Succeeded,
    /// Failed terminally
    Failed,
    /// Cancelled before or during execution
    Cancelled,
}

crate::simple_display! {
    StepStatus {
        Queued => "queued",
        Running => "running",
        AwaitingGate => "awaiting_gate",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed | StepStatus::Cancelled)
    }

    /// Step still counts against the run's remaining work.
    pub fn is_remaining(&self) -> bool {
        matches!(self, StepStatus::Queued | StepStatus::Running | StepStatus::AwaitingGate)
    }

    /// Legal transitions. Terminal statuses never transition here;
    /// explicit retry resets to queued through `Store::reset_step`.
    pub fn can_transition(self, to: StepStatus) -> bool {
        use StepStatus::*;
        match (self, to) {
            // No-op steps may complete without a lease
            (Queued, Running) | (Queued, Cancelled) | (Queued, Succeeded) => true,
            (Running, AwaitingGate) | (Running, Succeeded) | (Running, Failed)
            | (Running, Cancelled) => true,
            // Gate release re-enqueues through queued
            (AwaitingGate, Queued) | (AwaitingGate, Running) | (AwaitingGate, Succeeded)
            | (AwaitingGate, Failed) | (AwaitingGate, Cancelled) => true,
            _ => false,
        }
    }
}

/// Classification of a step failure, used by the runner to decide
/// between terminal failure and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// Rejected by the step's `_policy`
    PolicyDenied,
    /// No handler registered for the tool name
    UnknownTool,
    /// Bad inputs; never retried
    Validation,
    /// Retryable within queue attempt bounds
    Transient,
    /// Exceeded the per-step wall clock
    Timeout,
    /// Not retryable
    Permanent,
}

crate::simple_display! {
    StepErrorKind {
        PolicyDenied => "policy_denied",
        UnknownTool => "unknown_tool",
        Validation => "validation",
        Transient => "transient",
        Timeout => "timeout",
        Permanent => "permanent",
    }
}

/// Error record persisted on a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
    /// Set when the failure exhausted its attempt budget (dead-lettered).
    #[serde(default)]
    pub terminal: bool,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), terminal: false }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// One node of a plan, bound to a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub run_id: RunId,
    /// Ordinal name, unique within the run.
    pub name: String,
    pub tool: SmolStr,
    pub inputs: Value,
    pub status: StepStatus,
    pub idempotency_key: String,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

crate::builder! {
    pub struct StepBuilder => Step {
        into {
            name: String = "write readme",
            tool: SmolStr = "codegen",
            idempotency_key: String = "run-test:write readme:000000000000",
        }
        set {
            run_id: RunId = RunId::from_string("run-test"),
            inputs: Value = Value::Object(Default::default()),
            status: StepStatus = StepStatus::Queued,
            attempt: u32 = 1,
            created_at: DateTime<Utc> = Utc::now(),
        }
        option {
            started_at: DateTime<Utc> = None,
            ended_at: DateTime<Utc> = None,
            summary: Value = None,
            error: StepError = None,
        }
        computed {
            id: StepId = StepId::new(),
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;

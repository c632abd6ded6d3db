// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only run timeline events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::id::{RunId, StepId};

/// Well-known event types. Payloads are opaque JSON objects; consumers
/// must tolerate unknown fields and unknown types.
pub mod event_types {
    pub const RUN_CREATED: &str = "run.created";
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_SUCCEEDED: &str = "run.succeeded";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_CANCELLED: &str = "run.cancelled";

    pub const STEP_ENQUEUED: &str = "step.enqueued";
    pub const STEP_ENQUEUE_SKIPPED: &str = "step.enqueue.skipped";
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_SUCCEEDED: &str = "step.succeeded";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRIED: &str = "step.retried";
    pub const STEP_CANCELLED: &str = "step.cancelled";
    pub const STEP_DEAD_LETTERED: &str = "step.dead-lettered";
    pub const STEP_LEASE_LOST: &str = "step.lease.lost";
    pub const STEP_PROCESSING_ERROR: &str = "step.processing.error";

    pub const GATE_CREATED: &str = "gate.created";
    pub const GATE_APPROVED: &str = "gate.approved";
    pub const GATE_WAIVED: &str = "gate.waived";
    pub const GATE_REJECTED: &str = "gate.rejected";

    pub const POLICY_DENIED: &str = "policy.denied";
    pub const QUEUE_BACKPRESSURE: &str = "queue.backpressure";
}

/// One row of a run's timeline. `seq` is strictly increasing per run
/// with no gaps; allocation is the store driver's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub run_id: RunId,
    pub seq: u64,
    pub event_type: SmolStr,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default)]
    pub payload: Value,
}

impl EventRecord {
    /// Compact `key=value` summary for log lines.
    pub fn log_summary(&self) -> String {
        match &self.step_id {
            Some(step) => format!("{} run={} step={} seq={}", self.event_type, self.run_id, step, self.seq),
            None => format!("{} run={} seq={}", self.event_type, self.run_id, self.seq),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

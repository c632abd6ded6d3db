// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval gates: out-of-band blocking points on a step or run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::id::{GateId, RunId, StepId};

/// Reason strings are truncated to this many characters before recording.
pub const GATE_REASON_MAX: usize = 500;

/// Status of a gate. Terminal statuses are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Waived,
    Rejected,
}

crate::simple_display! {
    GateStatus {
        Pending => "pending",
        Approved => "approved",
        Waived => "waived",
        Rejected => "rejected",
    }
}

impl GateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GateStatus::Pending)
    }

    /// Approved and waived both unblock the owning step.
    pub fn unblocks(&self) -> bool {
        matches!(self, GateStatus::Approved | GateStatus::Waived)
    }
}

/// An approval point blocking a step (or, with no step id, a whole run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub id: GateId,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// e.g. "manual-approval", "typecheck", "unit"
    pub gate_type: SmolStr,
    pub status: GateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Truncate an operator-supplied reason to [`GATE_REASON_MAX`] characters.
pub fn truncate_reason(reason: &str) -> String {
    reason.chars().take(GATE_REASON_MAX).collect()
}

crate::builder! {
    pub struct GateBuilder => Gate {
        into {
            gate_type: SmolStr = "manual-approval",
        }
        set {
            run_id: RunId = RunId::from_string("run-test"),
            status: GateStatus = GateStatus::Pending,
            created_at: DateTime<Utc> = Utc::now(),
        }
        option {
            step_id: StepId = None,
            approved_by: String = None,
            reason: String = None,
            resolved_at: DateTime<Utc> = None,
        }
        computed {
            id: GateId = GateId::new(),
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RunId;
use crate::plan::Plan;

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted, steps not yet materialised or started
    Queued,
    /// At least one step is executing
    Running,
    /// Waiting on a pending gate
    Blocked,
    /// All steps succeeded
    Succeeded,
    /// At least one step failed terminally
    Failed,
    /// Cancelled by the client
    Cancelled,
}

crate::simple_display! {
    RunStatus {
        Queued => "queued",
        Running => "running",
        Blocked => "blocked",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RunStatus {
    /// A run is terminal only when no steps remain in
    /// queued/running/awaiting_gate.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Legal transitions of the run state machine.
    pub fn can_transition(self, to: RunStatus) -> bool {
        use RunStatus::*;
        match (self, to) {
            (Queued, Running) | (Queued, Cancelled) | (Queued, Failed) => true,
            (Running, Blocked) | (Running, Succeeded) | (Running, Failed) | (Running, Cancelled) => {
                true
            }
            (Blocked, Running) | (Blocked, Failed) | (Blocked, Cancelled) => true,
            // Explicit step retry revives a terminal run
            (Failed, Running) | (Cancelled, Running) => true,
            _ => false,
        }
    }
}

/// Tier of the submitting user. Carried by authenticated requests;
/// authentication itself is an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    Free,
    Pro,
    Enterprise,
}

crate::simple_display! {
    UserTier {
        Free => "free",
        Pro => "pro",
        Enterprise => "enterprise",
    }
}

/// Identity attached to a run by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub tier: UserTier,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, tier: UserTier) -> Self {
        Self { user_id: user_id.into(), tier }
    }
}

/// A single invocation of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub project_id: String,
    pub status: RunStatus,
    /// The submitted plan. Immutable after creation.
    pub plan: Plan,
    pub user: UserContext,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

crate::builder! {
    pub struct RunBuilder => Run {
        into {
            project_id: String = "proj-test",
        }
        set {
            status: RunStatus = RunStatus::Queued,
            plan: Plan = Plan::default(),
            user: UserContext = UserContext::new("user-test", UserTier::Free),
            created_at: DateTime<Utc> = Utc::now(),
        }
        option {
            started_at: DateTime<Utc> = None,
            ended_at: DateTime<Utc> = None,
        }
        computed {
            id: RunId = RunId::new(),
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

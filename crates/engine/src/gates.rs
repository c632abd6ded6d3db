// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gate creation and resolution.
//!
//! Gates come from three places: the plan (a `manual:deploy` step the
//! runner converts), gate tool handlers recording check outcomes, and the
//! public API. A pending gate parks its step in `awaiting_gate` and the
//! run in `blocked`; approval or waiver re-enqueues, rejection fails the
//! step. Terminal gate transitions are idempotent at this boundary.

use chrono::Utc;
use serde_json::json;

use fm_core::{
    event_types, truncate_reason, Gate, GateId, GateStatus, RunId, RunStatus, StepId, StepStatus,
};
use fm_store::Store;

use crate::engine::RunEngine;
use crate::error::EngineError;

/// Operator decision on a pending gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResolution {
    Approve,
    Waive,
    Reject,
}

impl GateResolution {
    fn status(self) -> GateStatus {
        match self {
            GateResolution::Approve => GateStatus::Approved,
            GateResolution::Waive => GateStatus::Waived,
            GateResolution::Reject => GateStatus::Rejected,
        }
    }

    fn event_type(self) -> &'static str {
        match self {
            GateResolution::Approve => event_types::GATE_APPROVED,
            GateResolution::Waive => event_types::GATE_WAIVED,
            GateResolution::Reject => event_types::GATE_REJECTED,
        }
    }
}

impl RunEngine {
    /// Create (or fetch) a gate; a freshly created pending gate blocks
    /// the run.
    pub async fn create_gate(
        &self,
        run_id: &RunId,
        step_id: Option<&StepId>,
        gate_type: &str,
    ) -> Result<Gate, EngineError> {
        let (gate, created) = self.store().create_or_get_gate(run_id, step_id, gate_type).await?;
        if created {
            self.timeline()
                .record(
                    run_id,
                    event_types::GATE_CREATED,
                    json!({ "gate_id": gate.id, "gate_type": gate.gate_type }),
                    step_id,
                )
                .await?;
            if gate.status == GateStatus::Pending {
                if let Some(run) = self.store().get_run(run_id).await? {
                    if matches!(run.status, RunStatus::Queued | RunStatus::Running) {
                        self.store()
                            .update_run_status(run_id, RunStatus::Blocked, None, None)
                            .await?;
                    }
                }
            }
        }
        Ok(gate)
    }

    /// Resolve a pending gate. Resolving an already-terminal gate is a
    /// no-op success returning the current row.
    pub async fn resolve_gate(
        &self,
        gate_id: &GateId,
        resolution: GateResolution,
        approved_by: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Gate, EngineError> {
        let Some(gate) = self.store().get_gate(gate_id).await? else {
            return Err(EngineError::GateNotFound(*gate_id));
        };
        if gate.status.is_terminal() {
            return Ok(gate);
        }

        let mut updated = gate.clone();
        updated.status = resolution.status();
        updated.approved_by = approved_by.map(|s| s.to_string());
        updated.reason = reason.map(truncate_reason);
        updated.resolved_at = Some(Utc::now());
        self.store().update_gate(&updated).await?;

        // Re-read: a concurrent resolution may have won
        let Some(gate) = self.store().get_gate(gate_id).await? else {
            return Err(EngineError::GateNotFound(*gate_id));
        };
        if gate.status != updated.status {
            return Ok(gate);
        }

        self.timeline()
            .record(
                &gate.run_id,
                resolution.event_type(),
                json!({
                    "gate_id": gate.id,
                    "gate_type": gate.gate_type,
                    "approved_by": gate.approved_by,
                    "reason": gate.reason,
                }),
                gate.step_id.as_ref(),
            )
            .await?;

        match resolution {
            GateResolution::Approve | GateResolution::Waive => {
                self.release_gate(&gate).await?;
            }
            GateResolution::Reject => {
                self.reject_gate(&gate).await?;
            }
        }
        Ok(gate)
    }

    /// Unblock the owning step (re-enqueue through queued) and resume the
    /// run when no pending gates remain.
    async fn release_gate(&self, gate: &Gate) -> Result<(), EngineError> {
        if let Some(step_id) = &gate.step_id {
            if self.store().lease_step(step_id, StepStatus::AwaitingGate, StepStatus::Queued).await?
            {
                tracing::info!(gate = %gate.id, step = %step_id, "gate released, step requeued");
            }
        }

        if self.store().count_pending_gates(&gate.run_id).await? == 0 {
            if let Some(run) = self.store().get_run(&gate.run_id).await? {
                if run.status == RunStatus::Blocked {
                    self.store()
                        .update_run_status(&gate.run_id, RunStatus::Running, None, None)
                        .await?;
                }
            }
            // Parked steps (the released one included) go back on the wire
            self.requeue_queued_steps(&gate.run_id).await?;
        }
        Ok(())
    }

    /// A rejected gate fails its step terminally; a run-level rejection
    /// fails the run.
    async fn reject_gate(&self, gate: &Gate) -> Result<(), EngineError> {
        match &gate.step_id {
            Some(step_id) => {
                if self
                    .store()
                    .lease_step(step_id, StepStatus::AwaitingGate, StepStatus::Failed)
                    .await?
                {
                    if let Some(mut step) = self.store().get_step(step_id).await? {
                        step.error = Some(fm_core::StepError::new(
                            fm_core::StepErrorKind::Permanent,
                            format!("gate {} rejected", gate.gate_type),
                        ));
                        self.store().update_step(&step).await?;
                        self.timeline()
                            .record(
                                &gate.run_id,
                                event_types::STEP_FAILED,
                                json!({ "name": step.name, "reason": "gate rejected" }),
                                Some(step_id),
                            )
                            .await?;
                    }
                }
                // Remaining steps resume; the failed step settles the run
                // through the completion check once they drain
                if self.store().count_pending_gates(&gate.run_id).await? == 0 {
                    if let Some(run) = self.store().get_run(&gate.run_id).await? {
                        if run.status == RunStatus::Blocked {
                            self.store()
                                .update_run_status(&gate.run_id, RunStatus::Running, None, None)
                                .await?;
                        }
                    }
                    self.requeue_queued_steps(&gate.run_id).await?;
                }
                self.finalize(&gate.run_id).await?;
            }
            None => {
                self.store()
                    .update_run_status(&gate.run_id, RunStatus::Failed, None, Some(Utc::now()))
                    .await?;
                self.timeline()
                    .record(
                        &gate.run_id,
                        event_types::RUN_FAILED,
                        json!({ "reason": "gate rejected" }),
                        None,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "gates_tests.rs"]
mod tests;

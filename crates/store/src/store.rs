// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Store`] trait: the behavioural contract both drivers satisfy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fm_core::{
    Artifact, EventRecord, Gate, GateId, OutboxId, Plan, Run, RunId, RunStatus, Step, StepId,
    StepStatus, UserContext,
};

use crate::error::StoreError;

/// Artifact fields supplied by the runner; the driver assigns id, path,
/// and metadata.
#[derive(Debug, Clone)]
pub struct NewArtifact<'a> {
    pub run_id: &'a RunId,
    pub step_id: &'a StepId,
    pub name: &'a str,
    pub mime: &'a str,
}

/// A queued external side-effect, published after the local write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub topic: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Result of an inbox dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxStatus {
    /// First delivery of this key.
    Fresh,
    /// Key recorded before; the delivery is a duplicate.
    Duplicate,
}

/// Durable persistence consumed by the engine, runner, and API layers.
///
/// Contract highlights:
/// - `create_step` is atomic with the idempotency-key insert: on conflict
///   it returns `Ok(None)` and the caller reads the existing step via
///   [`Store::get_step_by_idempotency_key`].
/// - `record_event` allocates the run's next sequence number; sequences
///   are strictly increasing and gapless per run.
/// - `lease_step` is a compare-and-swap on the step status, the only
///   primitive serialising worker leases.
#[async_trait]
pub trait Store: Send + Sync {
    // -- runs --

    async fn create_run(
        &self,
        plan: Plan,
        project_id: &str,
        user: UserContext,
    ) -> Result<Run, StoreError>;

    async fn get_run(&self, id: &RunId) -> Result<Option<Run>, StoreError>;

    /// Most recent first. `limit` is applied as given; clamping is the API
    /// boundary's job.
    async fn list_runs(
        &self,
        limit: usize,
        project_id: Option<&str>,
    ) -> Result<Vec<Run>, StoreError>;

    async fn update_run_status(
        &self,
        id: &RunId,
        status: RunStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    // -- steps --

    async fn create_step(
        &self,
        run_id: &RunId,
        name: &str,
        tool: &str,
        inputs: Value,
        idem_key: &str,
    ) -> Result<Option<Step>, StoreError>;

    async fn get_step_by_idempotency_key(
        &self,
        run_id: &RunId,
        key: &str,
    ) -> Result<Option<Step>, StoreError>;

    async fn get_step(&self, id: &StepId) -> Result<Option<Step>, StoreError>;

    /// Full-row update keyed by `step.id`.
    async fn update_step(&self, step: &Step) -> Result<(), StoreError>;

    /// Compare-and-swap the status. Returns false when the current status
    /// is not `from` (the lease was lost).
    async fn lease_step(
        &self,
        id: &StepId,
        from: StepStatus,
        to: StepStatus,
    ) -> Result<bool, StoreError>;

    /// Reset to queued and increment the attempt counter (explicit retry).
    async fn reset_step(&self, id: &StepId) -> Result<Step, StoreError>;

    async fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<Step>, StoreError>;

    /// Steps still in queued/running/awaiting_gate.
    async fn count_remaining_steps(&self, run_id: &RunId) -> Result<u64, StoreError>;

    // -- events --

    /// Append an event and return its sequence number.
    async fn record_event(
        &self,
        run_id: &RunId,
        event_type: &str,
        payload: Value,
        step_id: Option<&StepId>,
    ) -> Result<u64, StoreError>;

    async fn list_events(
        &self,
        run_id: &RunId,
        since_seq: Option<u64>,
    ) -> Result<Vec<EventRecord>, StoreError>;

    // -- gates --

    /// Returns the existing gate for `(run, step, gate_type)` when one
    /// exists, otherwise creates a pending gate. The flag reports whether
    /// this call created it.
    async fn create_or_get_gate(
        &self,
        run_id: &RunId,
        step_id: Option<&StepId>,
        gate_type: &str,
    ) -> Result<(Gate, bool), StoreError>;

    async fn get_gate(&self, id: &GateId) -> Result<Option<Gate>, StoreError>;

    async fn update_gate(&self, gate: &Gate) -> Result<(), StoreError>;

    async fn list_gates_by_run(&self, run_id: &RunId) -> Result<Vec<Gate>, StoreError>;

    async fn count_pending_gates(&self, run_id: &RunId) -> Result<u64, StoreError>;

    // -- artifacts --

    /// Persist artifact bytes and record the row. Artifacts are immutable;
    /// every call allocates a fresh artifact id.
    async fn add_artifact(
        &self,
        artifact: NewArtifact<'_>,
        bytes: &[u8],
    ) -> Result<Artifact, StoreError>;

    async fn list_artifacts_by_run(&self, run_id: &RunId) -> Result<Vec<Artifact>, StoreError>;

    async fn read_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, StoreError>;

    // -- outbox / inbox --

    async fn put_outbox(&self, topic: &str, payload: Value) -> Result<OutboxId, StoreError>;

    async fn take_unpublished_outbox(&self, limit: usize)
        -> Result<Vec<OutboxEntry>, StoreError>;

    async fn mark_outbox_published(&self, id: &OutboxId) -> Result<(), StoreError>;

    /// Record a delivery key for `consumer`; reports whether it was seen
    /// before.
    async fn inbox_seen(&self, consumer: &str, dedup_key: &str)
        -> Result<InboxStatus, StoreError>;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem store driver: JSONL journal + in-memory materialized view.
//!
//! Suited to development and offline tests. Single-process only; the
//! journal is the durable record and the maps are the read path.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use fm_core::{
    artifact_path, Artifact, ArtifactId, ArtifactMeta, EventRecord, Gate, GateId, GateStatus,
    OutboxId, Plan, Run, RunId, RunStatus, Step, StepId, StepStatus, UserContext,
};

use crate::error::StoreError;
use crate::journal::{Journal, JournalRecord};
use crate::store::{InboxStatus, NewArtifact, OutboxEntry, Store};

#[derive(Default)]
struct FsState {
    runs: HashMap<RunId, Run>,
    run_order: Vec<RunId>,
    steps: HashMap<StepId, Step>,
    steps_by_run: HashMap<RunId, Vec<StepId>>,
    /// Idempotency keys embed the run id, so the index is flat.
    idem: HashMap<String, StepId>,
    events: HashMap<RunId, Vec<EventRecord>>,
    gates: HashMap<GateId, Gate>,
    gates_by_run: HashMap<RunId, Vec<GateId>>,
    artifacts_by_run: HashMap<RunId, Vec<Artifact>>,
    outbox: Vec<OutboxEntry>,
    inbox: HashSet<(String, String)>,
}

struct Inner {
    journal: Journal,
    state: FsState,
}

/// Journal-backed filesystem driver.
pub struct FsStore {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl FsStore {
    /// Open (or create) a store rooted at `root`, replaying any existing
    /// journal into memory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("blobs"))?;
        let journal_path = root.join("journal.log");

        let mut state = FsState::default();
        let records = Journal::replay(&journal_path)?;
        let replayed = records.len();
        for record in records {
            apply(&mut state, record);
        }
        if replayed > 0 {
            tracing::info!(path = %journal_path.display(), records = replayed, "journal replayed");
        }

        let journal = Journal::open(&journal_path)?;
        Ok(Self { root, inner: Mutex::new(Inner { journal, state }) })
    }

    fn blob_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join("blobs").join(id.as_str())
    }

    /// Append to the journal, then fold the record into the live view.
    /// The append flushes first so a crash never leaves memory ahead of disk.
    fn commit(inner: &mut Inner, record: JournalRecord) -> Result<(), StoreError> {
        inner.journal.append(&record)?;
        apply(&mut inner.state, record);
        Ok(())
    }
}

/// Fold one record into the state. Used by both replay and the live path,
/// so every arm must be idempotent.
fn apply(state: &mut FsState, record: JournalRecord) {
    match record {
        JournalRecord::RunCreated { run } => {
            if !state.runs.contains_key(&run.id) {
                state.run_order.push(run.id);
                state.runs.insert(run.id, run);
            }
        }
        JournalRecord::RunStatusChanged { id, status, started_at, ended_at } => {
            if let Some(run) = state.runs.get_mut(&id) {
                run.status = status;
                if started_at.is_some() {
                    run.started_at = started_at;
                }
                if ended_at.is_some() {
                    run.ended_at = ended_at;
                }
            }
        }
        JournalRecord::StepCreated { step } => {
            if !state.steps.contains_key(&step.id) {
                state.idem.insert(step.idempotency_key.clone(), step.id);
                state.steps_by_run.entry(step.run_id).or_default().push(step.id);
                state.steps.insert(step.id, step);
            }
        }
        JournalRecord::StepUpdated { step } => {
            state.steps.insert(step.id, step);
        }
        JournalRecord::EventRecorded { event } => {
            let events = state.events.entry(event.run_id).or_default();
            // Idempotency: replay may see the same seq twice after a crash
            if events.last().map(|e| e.seq < event.seq).unwrap_or(true) {
                events.push(event);
            }
        }
        JournalRecord::GateCreated { gate } => {
            if !state.gates.contains_key(&gate.id) {
                state.gates_by_run.entry(gate.run_id).or_default().push(gate.id);
                state.gates.insert(gate.id, gate);
            }
        }
        JournalRecord::GateUpdated { gate } => {
            state.gates.insert(gate.id, gate);
        }
        JournalRecord::ArtifactAdded { artifact } => {
            let list = state.artifacts_by_run.entry(artifact.run_id).or_default();
            if !list.iter().any(|a| a.id == artifact.id) {
                list.push(artifact);
            }
        }
        JournalRecord::OutboxPut { entry } => {
            if !state.outbox.iter().any(|e| e.id == entry.id) {
                state.outbox.push(entry);
            }
        }
        JournalRecord::OutboxPublished { id, at } => {
            if let Some(entry) = state.outbox.iter_mut().find(|e| e.id == id) {
                entry.published_at = Some(at);
            }
        }
        JournalRecord::InboxSeen { consumer, key, .. } => {
            state.inbox.insert((consumer, key));
        }
    }
}

#[async_trait]
impl Store for FsStore {
    async fn create_run(
        &self,
        plan: Plan,
        project_id: &str,
        user: UserContext,
    ) -> Result<Run, StoreError> {
        let run = Run {
            id: RunId::new(),
            project_id: project_id.to_string(),
            status: RunStatus::Queued,
            plan,
            user,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, JournalRecord::RunCreated { run: run.clone() })?;
        Ok(run)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.inner.lock().state.runs.get(id).cloned())
    }

    async fn list_runs(
        &self,
        limit: usize,
        project_id: Option<&str>,
    ) -> Result<Vec<Run>, StoreError> {
        let inner = self.inner.lock();
        let runs = inner
            .state
            .run_order
            .iter()
            .rev()
            .filter_map(|id| inner.state.runs.get(id))
            .filter(|run| project_id.map(|p| run.project_id == p).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect();
        Ok(runs)
    }

    async fn update_run_status(
        &self,
        id: &RunId,
        status: RunStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(id) {
            return Err(StoreError::RunNotFound(*id));
        }
        Self::commit(
            &mut inner,
            JournalRecord::RunStatusChanged { id: *id, status, started_at, ended_at },
        )
    }

    async fn create_step(
        &self,
        run_id: &RunId,
        name: &str,
        tool: &str,
        inputs: Value,
        idem_key: &str,
    ) -> Result<Option<Step>, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(run_id) {
            return Err(StoreError::RunNotFound(*run_id));
        }
        if inner.state.idem.contains_key(idem_key) {
            // Conflict is a signal to reuse, not an error
            return Ok(None);
        }
        let step = Step {
            id: StepId::new(),
            run_id: *run_id,
            name: name.to_string(),
            tool: tool.into(),
            inputs,
            status: StepStatus::Queued,
            idempotency_key: idem_key.to_string(),
            attempt: 1,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            summary: None,
            error: None,
        };
        Self::commit(&mut inner, JournalRecord::StepCreated { step: step.clone() })?;
        Ok(Some(step))
    }

    async fn get_step_by_idempotency_key(
        &self,
        _run_id: &RunId,
        key: &str,
    ) -> Result<Option<Step>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.state.idem.get(key).and_then(|id| inner.state.steps.get(id)).cloned())
    }

    async fn get_step(&self, id: &StepId) -> Result<Option<Step>, StoreError> {
        Ok(self.inner.lock().state.steps.get(id).cloned())
    }

    async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.steps.contains_key(&step.id) {
            return Err(StoreError::StepNotFound(step.id));
        }
        Self::commit(&mut inner, JournalRecord::StepUpdated { step: step.clone() })
    }

    async fn lease_step(
        &self,
        id: &StepId,
        from: StepStatus,
        to: StepStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.state.steps.get(id) else {
            return Err(StoreError::StepNotFound(*id));
        };
        if step.status != from {
            return Ok(false);
        }
        let mut updated = step.clone();
        updated.status = to;
        if to == StepStatus::Running && updated.started_at.is_none() {
            updated.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            updated.ended_at = Some(Utc::now());
        }
        Self::commit(&mut inner, JournalRecord::StepUpdated { step: updated })?;
        Ok(true)
    }

    async fn reset_step(&self, id: &StepId) -> Result<Step, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.state.steps.get(id) else {
            return Err(StoreError::StepNotFound(*id));
        };
        let mut updated = step.clone();
        updated.status = StepStatus::Queued;
        updated.attempt += 1;
        updated.error = None;
        updated.started_at = None;
        updated.ended_at = None;
        Self::commit(&mut inner, JournalRecord::StepUpdated { step: updated.clone() })?;
        Ok(updated)
    }

    async fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<Step>, StoreError> {
        let inner = self.inner.lock();
        let steps = inner
            .state
            .steps_by_run
            .get(run_id)
            .map(|ids| ids.iter().filter_map(|id| inner.state.steps.get(id)).cloned().collect())
            .unwrap_or_default();
        Ok(steps)
    }

    async fn count_remaining_steps(&self, run_id: &RunId) -> Result<u64, StoreError> {
        let inner = self.inner.lock();
        let count = inner
            .state
            .steps_by_run
            .get(run_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.state.steps.get(id))
                    .filter(|s| s.status.is_remaining())
                    .count() as u64
            })
            .unwrap_or(0);
        Ok(count)
    }

    async fn record_event(
        &self,
        run_id: &RunId,
        event_type: &str,
        payload: Value,
        step_id: Option<&StepId>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(run_id) {
            return Err(StoreError::RunNotFound(*run_id));
        }
        let seq = inner.state.events.get(run_id).map(|e| e.len() as u64).unwrap_or(0) + 1;
        let event = EventRecord {
            run_id: *run_id,
            seq,
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            step_id: step_id.copied(),
            payload,
        };
        Self::commit(&mut inner, JournalRecord::EventRecorded { event })?;
        Ok(seq)
    }

    async fn list_events(
        &self,
        run_id: &RunId,
        since_seq: Option<u64>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let inner = self.inner.lock();
        let events = inner
            .state
            .events
            .get(run_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| since_seq.map(|s| e.seq > s).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn create_or_get_gate(
        &self,
        run_id: &RunId,
        step_id: Option<&StepId>,
        gate_type: &str,
    ) -> Result<(Gate, bool), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(run_id) {
            return Err(StoreError::RunNotFound(*run_id));
        }
        if let Some(existing) = inner
            .state
            .gates_by_run
            .get(run_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.state.gates.get(id))
            .find(|g| g.step_id.as_ref() == step_id && g.gate_type == gate_type)
        {
            return Ok((existing.clone(), false));
        }
        let gate = Gate {
            id: GateId::new(),
            run_id: *run_id,
            step_id: step_id.copied(),
            gate_type: gate_type.into(),
            status: GateStatus::Pending,
            approved_by: None,
            reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        Self::commit(&mut inner, JournalRecord::GateCreated { gate: gate.clone() })?;
        Ok((gate, true))
    }

    async fn get_gate(&self, id: &GateId) -> Result<Option<Gate>, StoreError> {
        Ok(self.inner.lock().state.gates.get(id).cloned())
    }

    async fn update_gate(&self, gate: &Gate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(current) = inner.state.gates.get(&gate.id) else {
            return Err(StoreError::GateNotFound(gate.id));
        };
        // Terminal gates are immutable; further mutations are no-ops
        if current.status.is_terminal() {
            return Ok(());
        }
        Self::commit(&mut inner, JournalRecord::GateUpdated { gate: gate.clone() })
    }

    async fn list_gates_by_run(&self, run_id: &RunId) -> Result<Vec<Gate>, StoreError> {
        let inner = self.inner.lock();
        let gates = inner
            .state
            .gates_by_run
            .get(run_id)
            .map(|ids| ids.iter().filter_map(|id| inner.state.gates.get(id)).cloned().collect())
            .unwrap_or_default();
        Ok(gates)
    }

    async fn count_pending_gates(&self, run_id: &RunId) -> Result<u64, StoreError> {
        let inner = self.inner.lock();
        let count = inner
            .state
            .gates_by_run
            .get(run_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.state.gates.get(id))
                    .filter(|g| g.status == GateStatus::Pending)
                    .count() as u64
            })
            .unwrap_or(0);
        Ok(count)
    }

    async fn add_artifact(
        &self,
        artifact: NewArtifact<'_>,
        bytes: &[u8],
    ) -> Result<Artifact, StoreError> {
        let id = ArtifactId::new();
        // Blob first; the row only exists once the bytes are durable
        std::fs::write(self.blob_path(&id), bytes)?;

        let record = Artifact {
            id,
            run_id: *artifact.run_id,
            step_id: *artifact.step_id,
            name: artifact.name.to_string(),
            mime: artifact.mime.to_string(),
            path: artifact_path(artifact.run_id, artifact.step_id, artifact.name),
            meta: ArtifactMeta { driver: Some("fs".to_string()), size: Some(bytes.len() as u64) },
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, JournalRecord::ArtifactAdded { artifact: record.clone() })?;
        Ok(record)
    }

    async fn list_artifacts_by_run(&self, run_id: &RunId) -> Result<Vec<Artifact>, StoreError> {
        Ok(self.inner.lock().state.artifacts_by_run.get(run_id).cloned().unwrap_or_default())
    }

    async fn read_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, StoreError> {
        Ok(std::fs::read(self.blob_path(&artifact.id))?)
    }

    async fn put_outbox(&self, topic: &str, payload: Value) -> Result<OutboxId, StoreError> {
        let entry = OutboxEntry {
            id: OutboxId::new(),
            topic: topic.to_string(),
            payload,
            created_at: Utc::now(),
            published_at: None,
        };
        let id = entry.id;
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, JournalRecord::OutboxPut { entry })?;
        Ok(id)
    }

    async fn take_unpublished_outbox(
        &self,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .state
            .outbox
            .iter()
            .filter(|e| e.published_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_outbox_published(&self, id: &OutboxId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, JournalRecord::OutboxPublished { id: *id, at: Utc::now() })
    }

    async fn inbox_seen(
        &self,
        consumer: &str,
        dedup_key: &str,
    ) -> Result<InboxStatus, StoreError> {
        let mut inner = self.inner.lock();
        let key = (consumer.to_string(), dedup_key.to_string());
        if inner.state.inbox.contains(&key) {
            return Ok(InboxStatus::Duplicate);
        }
        Self::commit(
            &mut inner,
            JournalRecord::InboxSeen {
                consumer: consumer.to_string(),
                key: dedup_key.to_string(),
                at: Utc::now(),
            },
        )?;
        Ok(InboxStatus::Fresh)
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;

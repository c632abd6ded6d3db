// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The step executor loop.
//!
//! Lease → policy → dispatch → settle. A step is leased by compare-and-
//! swapping `queued → running`; lost races are acked with a
//! `step.lease.lost` event. Deterministic failures settle the step
//! terminally; transient ones requeue it (the queue applies the backoff
//! and the dead-letter cap).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use fm_core::{
    event_types, Run, RunId, RunStatus, Step, StepError, StepErrorKind, StepPolicy, StepStatus,
};
use fm_engine::{finalize_run, CancelRegistry, StepExecutor, Timeline};
use fm_queue::{
    topics, Delivery, EnqueueOpts, HandlerError, JobHandler, Queue, StepReady, MAX_ATTEMPTS,
};
use fm_resilience::timeout;
use fm_store::{InboxStatus, NewArtifact, Store, StoreError};

use crate::registry::{ToolContext, ToolError, ToolOutcome, ToolRegistry};

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Per-step wall clock.
    pub step_timeout: std::time::Duration,
    /// Redelivery delay for steps parked behind a blocked run.
    pub defer_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { step_timeout: std::time::Duration::from_secs(30), defer_delay_ms: 1_000 }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self { step_timeout: fm_core::env::step_timeout(), ..Default::default() }
    }
}

/// Settled outcome of one delivery.
enum Settled {
    /// Ack the job.
    Ack,
    /// Nack: transient failure, the queue reschedules or dead-letters.
    Nack(String),
}

/// Consumes `step.ready` jobs and executes tool handlers.
pub struct StepRunner {
    store: Arc<dyn Store>,
    queue: Arc<dyn Queue>,
    timeline: Timeline,
    cancels: Arc<CancelRegistry>,
    registry: ToolRegistry,
    config: RunnerConfig,
}

impl StepRunner {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn Queue>,
        timeline: Timeline,
        cancels: Arc<CancelRegistry>,
        registry: ToolRegistry,
        config: RunnerConfig,
    ) -> Arc<Self> {
        Arc::new(Self { store, queue, timeline, cancels, registry, config })
    }

    /// Register `runner` as the `step.ready` consumer.
    pub async fn subscribe(runner: &Arc<Self>) -> Result<(), fm_queue::QueueError> {
        let handler = Arc::new(RunnerHandler { runner: Arc::clone(runner) });
        runner.queue.subscribe(topics::STEP_READY, handler).await
    }

    /// Execute one job to a settled outcome. `Err` nacks the delivery.
    pub async fn run_job(&self, job: StepReady) -> Result<(), HandlerError> {
        match self.run_job_inner(&job).await {
            Ok(Settled::Ack) => Ok(()),
            Ok(Settled::Nack(reason)) => Err(HandlerError::new(reason)),
            Err(err) if err.is_retryable() => Err(HandlerError::new(err.to_string())),
            Err(err) => {
                // Non-retryable store failure: surface on the timeline and ack
                tracing::error!(step = %job.step_id, error = %err, "step processing failed");
                let _ = self
                    .timeline
                    .record(
                        &job.run_id,
                        event_types::STEP_PROCESSING_ERROR,
                        json!({ "error": err.to_string() }),
                        Some(&job.step_id),
                    )
                    .await;
                Ok(())
            }
        }
    }

    async fn run_job_inner(&self, job: &StepReady) -> Result<Settled, StoreError> {
        let run_id = job.run_id;
        let step_id = job.step_id;

        // Cancellation flag is checked before any work starts
        if self.cancels.is_cancelled(&run_id) {
            if self.store.lease_step(&step_id, StepStatus::Queued, StepStatus::Cancelled).await? {
                self.record(&run_id, event_types::STEP_CANCELLED, json!({}), Some(&step_id)).await;
            }
            return Ok(Settled::Ack);
        }

        let Some(run) = self.store.get_run(&run_id).await? else {
            tracing::warn!(run = %run_id, step = %step_id, "job for unknown run dropped");
            return Ok(Settled::Ack);
        };

        // A blocked run parks its remaining steps: redeliver later without
        // burning the attempt budget.
        if run.status == RunStatus::Blocked {
            self.defer(job).await?;
            return Ok(Settled::Ack);
        }
        if run.status.is_terminal() {
            return Ok(Settled::Ack);
        }

        // Lease: the only writer of queued → running
        if !self.store.lease_step(&step_id, StepStatus::Queued, StepStatus::Running).await? {
            let current = self.store.get_step(&step_id).await?;
            tracing::debug!(
                step = %step_id,
                status = current.map(|s| s.status.to_string()).unwrap_or_default(),
                "lease lost"
            );
            self.record(&run_id, event_types::STEP_LEASE_LOST, json!({}), Some(&step_id)).await;
            return Ok(Settled::Ack);
        }

        self.mark_run_started(&run).await?;

        let Some(step) = self.store.get_step(&step_id).await? else {
            return Err(StoreError::StepNotFound(step_id));
        };
        self.record(
            &run_id,
            event_types::STEP_STARTED,
            json!({ "name": step.name, "tool": step.tool, "attempt": job.attempt }),
            Some(&step_id),
        )
        .await;

        // Policy check before the tool ever runs
        let policy = StepPolicy::from_inputs(&step.inputs).unwrap_or_default();
        if !policy.allows_tool(&step.tool) {
            self.record(
                &run_id,
                event_types::POLICY_DENIED,
                json!({ "tool": step.tool, "tools_allowed": policy.tools_allowed }),
                Some(&step_id),
            )
            .await;
            self.fail_step(
                &step,
                StepError::new(
                    StepErrorKind::PolicyDenied,
                    format!("tool {} not in tools_allowed", step.tool),
                ),
            )
            .await?;
            return Ok(Settled::Ack);
        }

        let Some(handler) = self.registry.get(&step.tool) else {
            self.fail_step(
                &step,
                StepError::new(StepErrorKind::UnknownTool, format!("tool.unknown: {}", step.tool)),
            )
            .await?;
            return Ok(Settled::Ack);
        };

        let token = self.cancels.token(&run_id);
        let ctx = ToolContext {
            run_id,
            step_id,
            inputs: step.inputs.clone(),
            policy,
            cancel: token.clone(),
            attempt: job.attempt,
        };

        let invocation = tokio::select! {
            _ = token.cancelled() => {
                if self.store.lease_step(&step_id, StepStatus::Running, StepStatus::Cancelled).await? {
                    self.record(&run_id, event_types::STEP_CANCELLED, json!({}), Some(&step_id)).await;
                }
                finalize_quiet(&self.store, &self.timeline, &run_id).await;
                return Ok(Settled::Ack);
            }
            result = timeout(self.config.step_timeout, handler.invoke(ctx)) => result,
        };

        let result = match invocation {
            Ok(result) => result,
            Err(elapsed) => Err(ToolError::Transient(elapsed.to_string())),
        };

        match result {
            Ok(ToolOutcome::Success { summary, artifacts }) => {
                self.settle_success(&step, summary, artifacts).await?;
                Ok(Settled::Ack)
            }
            Ok(ToolOutcome::AwaitGate { gate_type }) => self.park_on_gate(&step, &gate_type).await,
            Ok(ToolOutcome::Gate { gate_type, passed, reason }) => {
                self.settle_check_gate(&step, &gate_type, passed, reason).await?;
                Ok(Settled::Ack)
            }
            Err(err) => self.settle_failure(&step, job, err).await,
        }
    }

    /// Success: artifacts, summary, terminal transition, run completion.
    async fn settle_success(
        &self,
        step: &Step,
        summary: serde_json::Value,
        artifacts: Vec<crate::registry::ToolArtifact>,
    ) -> Result<(), StoreError> {
        for artifact in &artifacts {
            self.store
                .add_artifact(
                    NewArtifact {
                        run_id: &step.run_id,
                        step_id: &step.id,
                        name: &artifact.name,
                        mime: &artifact.mime,
                    },
                    &artifact.bytes,
                )
                .await?;
        }

        let mut updated = step.clone();
        updated.summary = Some(summary.clone());
        self.store.update_step(&updated).await?;
        self.store.lease_step(&step.id, StepStatus::Running, StepStatus::Succeeded).await?;
        self.record(
            &step.run_id,
            event_types::STEP_SUCCEEDED,
            json!({ "name": step.name, "summary": summary }),
            Some(&step.id),
        )
        .await;
        finalize_quiet(&self.store, &self.timeline, &step.run_id).await;
        Ok(())
    }

    /// `manual:*` tools: park the step on a pending gate. When the gate is
    /// already resolved (redelivery after approval), the step settles.
    async fn park_on_gate(&self, step: &Step, gate_type: &str) -> Result<Settled, StoreError> {
        let (gate, created) =
            self.store.create_or_get_gate(&step.run_id, Some(&step.id), gate_type).await?;
        if created {
            self.record(
                &step.run_id,
                event_types::GATE_CREATED,
                json!({ "gate_id": gate.id, "gate_type": gate.gate_type }),
                Some(&step.id),
            )
            .await;
        }

        if gate.status.unblocks() {
            self.settle_success(
                step,
                json!({ "gate": gate.gate_type, "resolution": gate.status }),
                vec![],
            )
            .await?;
            return Ok(Settled::Ack);
        }
        if gate.status == fm_core::GateStatus::Rejected {
            self.fail_step(
                step,
                StepError::new(
                    StepErrorKind::Permanent,
                    format!("gate {} rejected", gate.gate_type),
                ),
            )
            .await?;
            return Ok(Settled::Ack);
        }

        // Pending: park the step, block the run
        self.store.lease_step(&step.id, StepStatus::Running, StepStatus::AwaitingGate).await?;
        let run = self.store.get_run(&step.run_id).await?;
        if run.map(|r| matches!(r.status, RunStatus::Queued | RunStatus::Running)).unwrap_or(false)
        {
            self.store.update_run_status(&step.run_id, RunStatus::Blocked, None, None).await?;
        }
        tracing::info!(step = %step.id, gate = %gate.id, "step awaiting gate");
        Ok(Settled::Ack)
    }

    /// `gate:*` check tools: record the gate with its evaluated outcome
    /// and settle the step on the spot.
    async fn settle_check_gate(
        &self,
        step: &Step,
        gate_type: &str,
        passed: bool,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        let (gate, created) =
            self.store.create_or_get_gate(&step.run_id, Some(&step.id), gate_type).await?;
        if created {
            self.record(
                &step.run_id,
                event_types::GATE_CREATED,
                json!({ "gate_id": gate.id, "gate_type": gate.gate_type }),
                Some(&step.id),
            )
            .await;
        }

        let mut resolved = gate.clone();
        resolved.status =
            if passed { fm_core::GateStatus::Approved } else { fm_core::GateStatus::Rejected };
        resolved.reason = reason.as_deref().map(fm_core::truncate_reason);
        resolved.resolved_at = Some(chrono::Utc::now());
        self.store.update_gate(&resolved).await?;
        let event = if passed { event_types::GATE_APPROVED } else { event_types::GATE_REJECTED };
        self.record(
            &step.run_id,
            event,
            json!({ "gate_id": gate.id, "gate_type": gate.gate_type, "reason": resolved.reason }),
            Some(&step.id),
        )
        .await;

        if passed {
            self.settle_success(step, json!({ "gate": gate_type, "passed": true }), vec![]).await
        } else {
            self.fail_step(
                step,
                StepError::new(
                    StepErrorKind::Validation,
                    reason.unwrap_or_else(|| format!("gate {gate_type} failed")),
                ),
            )
            .await
        }
    }

    /// Classify a handler failure and settle or nack.
    async fn settle_failure(
        &self,
        step: &Step,
        job: &StepReady,
        err: ToolError,
    ) -> Result<Settled, StoreError> {
        match err {
            ToolError::Validation(msg) => {
                self.fail_step(step, StepError::new(StepErrorKind::Validation, msg)).await?;
                Ok(Settled::Ack)
            }
            ToolError::Fatal(msg) => {
                self.fail_step(step, StepError::new(StepErrorKind::Permanent, msg)).await?;
                Ok(Settled::Ack)
            }
            ToolError::Transient(msg) if job.attempt >= MAX_ATTEMPTS => {
                // Budget spent: terminal failure here, dead-letter in the queue
                self.record(
                    &step.run_id,
                    event_types::STEP_DEAD_LETTERED,
                    json!({ "name": step.name, "attempts": job.attempt, "error": msg }),
                    Some(&step.id),
                )
                .await;
                self.fail_step(
                    step,
                    StepError::new(StepErrorKind::Transient, msg.clone()).terminal(),
                )
                .await?;
                Ok(Settled::Nack(msg))
            }
            ToolError::Transient(msg) => {
                // Back to queued so the redelivery can lease again
                self.store.reset_step(&step.id).await?;
                tracing::warn!(
                    step = %step.id,
                    attempt = job.attempt,
                    error = %msg,
                    "transient step failure, requeued"
                );
                Ok(Settled::Nack(msg))
            }
        }
    }

    /// Terminal failure: error record, event, run completion check.
    async fn fail_step(&self, step: &Step, error: StepError) -> Result<(), StoreError> {
        let mut updated = step.clone();
        updated.error = Some(error.clone());
        self.store.update_step(&updated).await?;
        self.store.lease_step(&step.id, StepStatus::Running, StepStatus::Failed).await?;
        self.record(
            &step.run_id,
            event_types::STEP_FAILED,
            json!({ "name": step.name, "error": error.message, "kind": error.kind }),
            Some(&step.id),
        )
        .await;
        finalize_quiet(&self.store, &self.timeline, &step.run_id).await;
        Ok(())
    }

    /// First leased step flips the run queued → running.
    async fn mark_run_started(&self, run: &Run) -> Result<(), StoreError> {
        if run.status != RunStatus::Queued {
            return Ok(());
        }
        self.store
            .update_run_status(&run.id, RunStatus::Running, Some(chrono::Utc::now()), None)
            .await?;
        self.record(&run.id, event_types::RUN_STARTED, json!({}), None).await;
        Ok(())
    }

    /// Redeliver a job untouched (same attempt) after a short delay.
    async fn defer(&self, job: &StepReady) -> Result<(), StoreError> {
        let payload = serde_json::to_value(job)?;
        if let Err(err) = self
            .queue
            .enqueue(
                topics::STEP_READY,
                payload,
                EnqueueOpts { delay_ms: self.config.defer_delay_ms, attempt: Some(job.attempt) },
            )
            .await
        {
            tracing::warn!(step = %job.step_id, error = %err, "defer enqueue failed");
        }
        Ok(())
    }

    /// Timeline writes never fail the step flow.
    async fn record(
        &self,
        run_id: &RunId,
        event_type: &str,
        payload: serde_json::Value,
        step_id: Option<&fm_core::StepId>,
    ) {
        if let Err(err) = self.timeline.record(run_id, event_type, payload, step_id).await {
            tracing::warn!(run = %run_id, event = event_type, error = %err, "event write failed");
        }
    }
}

async fn finalize_quiet(store: &Arc<dyn Store>, timeline: &Timeline, run_id: &RunId) {
    if let Err(err) = finalize_run(store, timeline, run_id).await {
        tracing::warn!(run = %run_id, error = %err, "run completion check failed");
    }
}

/// Queue-facing adapter.
struct RunnerHandler {
    runner: Arc<StepRunner>,
}

#[async_trait]
impl JobHandler for RunnerHandler {
    async fn handle(&self, job: Delivery) -> Result<(), HandlerError> {
        // Inbound dedup: the same delivery attempt is processed once.
        // Nack retries and deferred copies carry fresh keys, so only true
        // broker redeliveries (ack lost, visibility timeout) short out.
        let dedup_key = format!("{}:{}", job.id, job.attempt);
        match self.runner.store.inbox_seen("step-runner", &dedup_key).await {
            Ok(InboxStatus::Duplicate) => {
                tracing::debug!(job = %job.id, attempt = job.attempt, "duplicate delivery dropped");
                return Ok(());
            }
            Ok(InboxStatus::Fresh) => {}
            Err(err) => {
                // Dedup is an optimisation; the CAS lease stays the
                // correctness backstop
                tracing::warn!(job = %job.id, error = %err, "inbox check failed");
            }
        }

        // Unknown payload fields are tolerated; unreadable payloads are
        // poison and get acked with a warning.
        let parsed: Result<StepReady, _> = serde_json::from_value(job.payload.clone());
        match parsed {
            Ok(mut step_job) => {
                step_job.attempt = job.attempt;
                self.runner.run_job(step_job).await
            }
            Err(err) => {
                tracing::warn!(job = %job.id, error = %err, "unreadable step.ready payload dropped");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StepExecutor for StepRunner {
    async fn execute(&self, job: StepReady) -> Result<(), HandlerError> {
        self.run_job(job).await
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

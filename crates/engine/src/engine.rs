// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run/step lifecycle engine.
//!
//! Run creation is optimistic: the caller gets the run back as soon as it
//! is durable, and step materialisation happens on a background task.
//! Materialisation failures land in the timeline, never in the create
//! response.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;

use fm_core::{
    event_types, idempotency_key, Plan, Run, RunId, RunStatus, Step, StepStatus, UserContext,
};
use fm_queue::{topics, EnqueueOpts, HandlerError, Queue, StepReady, MAX_ATTEMPTS};
use fm_store::{Store, StoreError};

use crate::cancel::CancelRegistry;
use crate::error::EngineError;
use crate::timeline::Timeline;

/// Upper bound on a backpressure-imposed enqueue delay.
const BACKPRESSURE_DELAY_CAP_MS: u64 = 15_000;

/// Engine tuning, normally read from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backpressure_age_ms: u64,
    pub disable_inline_runner: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { backpressure_age_ms: 5_000, disable_inline_runner: false }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            backpressure_age_ms: fm_core::env::backpressure_age_ms(),
            disable_inline_runner: fm_core::env::disable_inline_runner(),
        }
    }
}

/// Admission-control delay for a new step enqueue:
/// `min(15000, (age - threshold) / 2)` once the oldest pending job
/// exceeds the threshold.
pub fn backpressure_delay_ms(oldest_age_ms: u64, threshold_ms: u64) -> u64 {
    if oldest_age_ms > threshold_ms {
        ((oldest_age_ms - threshold_ms) / 2).min(BACKPRESSURE_DELAY_CAP_MS)
    } else {
        0
    }
}

/// Executes one step-ready job to a settled outcome. Implemented by the
/// worker runner; the engine calls it directly on the inline-fallback
/// path. `Err` means a transient failure worth another attempt.
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, job: StepReady) -> Result<(), HandlerError>;
}

/// Run completion check shared by the runner and gate resolution: once no
/// steps remain and no gate is pending, the run settles into succeeded,
/// failed, or cancelled. Returns the terminal status when it was applied.
pub async fn finalize_run(
    store: &Arc<dyn Store>,
    timeline: &Timeline,
    run_id: &RunId,
) -> Result<Option<RunStatus>, EngineError> {
    let remaining = store.count_remaining_steps(run_id).await?;
    if remaining > 0 {
        return Ok(None);
    }
    if store.count_pending_gates(run_id).await? > 0 {
        return Ok(None);
    }
    let Some(run) = store.get_run(run_id).await? else {
        return Err(EngineError::RunNotFound(*run_id));
    };
    if run.status.is_terminal() {
        return Ok(None);
    }

    let steps = store.list_steps_by_run(run_id).await?;
    let any_failed = steps.iter().any(|s| s.status == StepStatus::Failed);
    let any_cancelled = steps.iter().any(|s| s.status == StepStatus::Cancelled);
    let (status, event) = if any_failed {
        (RunStatus::Failed, event_types::RUN_FAILED)
    } else if any_cancelled {
        (RunStatus::Cancelled, event_types::RUN_CANCELLED)
    } else {
        (RunStatus::Succeeded, event_types::RUN_SUCCEEDED)
    };

    store.update_run_status(run_id, status, None, Some(Utc::now())).await?;
    timeline.record(run_id, event, json!({ "steps": steps.len() }), None).await?;
    Ok(Some(status))
}

/// Owns run/step state mutation on the control-plane side.
pub struct RunEngine {
    store: Arc<dyn Store>,
    queue: Arc<dyn Queue>,
    timeline: Timeline,
    cancels: Arc<CancelRegistry>,
    config: EngineConfig,
    executor: Mutex<Option<Arc<dyn StepExecutor>>>,
    /// One-shot guard so the inline fallback and a late queue subscriber
    /// cannot both run the same step.
    inline_claimed: Mutex<HashSet<fm_core::StepId>>,
    /// Self-handle for spawning the materialise task.
    me: Weak<RunEngine>,
}

impl RunEngine {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn Queue>, config: EngineConfig) -> Arc<Self> {
        let timeline = Timeline::new(Arc::clone(&store));
        Arc::new_cyclic(|me| Self {
            store,
            queue,
            timeline,
            cancels: Arc::new(CancelRegistry::new()),
            config,
            executor: Mutex::new(None),
            inline_claimed: Mutex::new(HashSet::new()),
            me: me.clone(),
        })
    }

    /// Wire the inline-fallback executor (the worker runner). Without it
    /// the fallback path is disabled.
    pub fn set_executor(&self, executor: Arc<dyn StepExecutor>) {
        *self.executor.lock() = Some(executor);
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn cancels(&self) -> &Arc<CancelRegistry> {
        &self.cancels
    }

    /// Create a run and return it immediately; steps materialise on a
    /// background task.
    pub async fn create_run(
        &self,
        plan: Plan,
        project_id: &str,
        user: UserContext,
    ) -> Result<Run, EngineError> {
        if let Some(dup) = plan.duplicate_step_name() {
            return Err(EngineError::InvalidPlan(format!("duplicate step name: {dup}")));
        }

        let run = self.store.create_run(plan, project_id, user).await?;
        self.timeline
            .record(&run.id, event_types::RUN_CREATED, json!({ "plan": run.plan }), None)
            .await?;

        // Read-back check guards against ephemeral-storage misconfiguration
        match self.store.get_run(&run.id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(run = %run.id, "created run not readable back");
            }
            Err(err @ StoreError::Corrupt(_)) => return Err(err.into()),
            Err(err) => {
                tracing::warn!(run = %run.id, error = %err, "read-back verification failed");
            }
        }

        let Some(engine) = self.me.upgrade() else {
            // Engine is being torn down; the run stays queued
            return Ok(run);
        };
        let spawned = run.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.materialise_steps(&spawned).await {
                tracing::error!(run = %spawned.id, error = %err, "step materialisation failed");
                let _ = engine
                    .timeline
                    .record(
                        &spawned.id,
                        event_types::STEP_PROCESSING_ERROR,
                        json!({ "error": err.to_string() }),
                        None,
                    )
                    .await;
            }
        });

        Ok(run)
    }

    /// Materialise the plan's steps: idempotent creation, enqueue with
    /// backpressure, inline fallback. Safe to run more than once for the
    /// same run.
    pub async fn materialise_steps(&self, run: &Run) -> Result<(), EngineError> {
        for plan_step in &run.plan.steps {
            let inputs = plan_step.effective_inputs();
            let key = idempotency_key(&run.id, &plan_step.name, &inputs);

            let step = match self
                .store
                .create_step(&run.id, &plan_step.name, &plan_step.tool, inputs, &key)
                .await?
            {
                Some(step) => step,
                None => match self.store.get_step_by_idempotency_key(&run.id, &key).await? {
                    Some(step) => step,
                    None => {
                        tracing::warn!(
                            run = %run.id,
                            step = %plan_step.name,
                            "idempotency conflict but no step row; skipping"
                        );
                        continue;
                    }
                },
            };

            if step.status.is_terminal() {
                self.timeline
                    .record(
                        &run.id,
                        event_types::STEP_ENQUEUE_SKIPPED,
                        json!({ "name": step.name, "status": step.status }),
                        Some(&step.id),
                    )
                    .await?;
                continue;
            }

            self.timeline
                .record(
                    &run.id,
                    event_types::STEP_ENQUEUED,
                    json!({
                        "name": step.name,
                        "tool": step.tool,
                        "idempotency_key": step.idempotency_key,
                    }),
                    Some(&step.id),
                )
                .await?;

            let delay_ms = self.enqueue_delay(&run.id).await?;
            let job = StepReady::new(run.id, step.id, key, step.attempt);
            self.enqueue_step(&job, delay_ms).await?;
        }
        Ok(())
    }

    /// Backpressure probe; records `queue.backpressure` when a delay is
    /// imposed.
    async fn enqueue_delay(&self, run_id: &RunId) -> Result<u64, EngineError> {
        let age_ms = self.queue.oldest_age_ms(topics::STEP_READY).await?.unwrap_or(0);
        let delay_ms = backpressure_delay_ms(age_ms, self.config.backpressure_age_ms);
        if delay_ms > 0 {
            self.timeline
                .record(
                    run_id,
                    event_types::QUEUE_BACKPRESSURE,
                    json!({ "ageMs": age_ms, "delayMs": delay_ms }),
                    None,
                )
                .await?;
        }
        Ok(delay_ms)
    }

    /// Enqueue a step-ready job and, when applicable, run it inline.
    pub(crate) async fn enqueue_step(
        &self,
        job: &StepReady,
        delay_ms: u64,
    ) -> Result<(), EngineError> {
        self.queue
            .enqueue(
                topics::STEP_READY,
                serde_json::to_value(job).map_err(fm_queue::QueueError::from)?,
                EnqueueOpts { delay_ms, attempt: Some(job.attempt) },
            )
            .await?;
        self.maybe_run_inline(job.clone(), delay_ms).await;
        Ok(())
    }

    /// Single-process fallback: memory driver, no subscriber, not
    /// disabled. The one-shot claim plus the runner's CAS lease guard
    /// against double execution.
    fn inline_applies(&self) -> bool {
        self.queue.driver_name() == "memory"
            && !self.queue.has_subscribers(topics::STEP_READY)
            && !self.config.disable_inline_runner
    }

    fn claim_inline(&self, step_id: &fm_core::StepId) -> bool {
        self.inline_claimed.lock().insert(*step_id)
    }

    async fn maybe_run_inline(&self, job: StepReady, delay_ms: u64) {
        if !self.inline_applies() {
            return;
        }
        let Some(executor) = self.executor.lock().clone() else {
            tracing::debug!(step = %job.step_id, "inline fallback without executor; job stays queued");
            return;
        };
        if !self.claim_inline(&job.step_id) {
            return;
        }
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }

        let mut job = job;
        loop {
            match executor.execute(job.clone()).await {
                Ok(()) => break,
                Err(err) if job.attempt < MAX_ATTEMPTS => {
                    let delay = fm_queue::retry_delay(job.attempt);
                    tracing::debug!(
                        step = %job.step_id,
                        attempt = job.attempt,
                        error = %err,
                        "inline attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    job.attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(step = %job.step_id, error = %err, "inline attempts exhausted");
                    break;
                }
            }
        }
    }

    /// Re-enqueue all still-queued steps of a run. Used after a gate
    /// release so parked work resumes even without a queue subscriber.
    pub(crate) async fn requeue_queued_steps(&self, run_id: &RunId) -> Result<(), EngineError> {
        let steps = self.store.list_steps_by_run(run_id).await?;
        for step in steps.into_iter().filter(|s| s.status == StepStatus::Queued) {
            // Allow the inline path to pick the step up again
            self.inline_claimed.lock().remove(&step.id);
            let job = StepReady::new(*run_id, step.id, step.idempotency_key.clone(), step.attempt);
            self.enqueue_step(&job, 0).await?;
        }
        Ok(())
    }

    /// Explicit retry of a failed or cancelled step.
    pub async fn retry_step(&self, run_id: &RunId, step_id: &fm_core::StepId) -> Result<Step, EngineError> {
        let step = match self.store.get_step(step_id).await? {
            Some(step) if step.run_id == *run_id => step,
            _ => return Err(EngineError::StepNotFound(*step_id)),
        };
        if !matches!(step.status, StepStatus::Failed | StepStatus::Cancelled) {
            return Err(EngineError::StepNotRetryable { id: *step_id, status: step.status });
        }

        let reset = self.store.reset_step(step_id).await?;
        self.timeline
            .record(
                run_id,
                event_types::STEP_RETRIED,
                json!({ "name": reset.name, "attempt": reset.attempt }),
                Some(step_id),
            )
            .await?;

        // A terminal run comes back to life for the retried step
        if let Some(run) = self.store.get_run(run_id).await? {
            if run.status.is_terminal() {
                self.store.update_run_status(run_id, RunStatus::Running, None, None).await?;
            }
        }

        self.inline_claimed.lock().remove(step_id);
        let delay_ms = self.enqueue_delay(run_id).await?;
        let job = StepReady::new(*run_id, reset.id, reset.idempotency_key.clone(), reset.attempt);
        self.enqueue_step(&job, delay_ms).await?;
        Ok(reset)
    }

    /// Cancel a run: mark it, trip the runner flag, cancel parked steps.
    /// In-flight steps observe the cancellation token.
    pub async fn cancel_run(&self, run_id: &RunId) -> Result<Run, EngineError> {
        let Some(run) = self.store.get_run(run_id).await? else {
            return Err(EngineError::RunNotFound(*run_id));
        };
        if run.status.is_terminal() {
            return Ok(run);
        }

        self.cancels.cancel(run_id);

        let steps = self.store.list_steps_by_run(run_id).await?;
        for step in steps {
            let from = match step.status {
                StepStatus::Queued => StepStatus::Queued,
                StepStatus::AwaitingGate => StepStatus::AwaitingGate,
                // Running steps settle through the runner's abort path
                _ => continue,
            };
            if self.store.lease_step(&step.id, from, StepStatus::Cancelled).await? {
                self.queue.drop_pending_step(&step.id).await?;
                self.timeline
                    .record(
                        run_id,
                        event_types::STEP_CANCELLED,
                        json!({ "name": step.name }),
                        Some(&step.id),
                    )
                    .await?;
            }
        }

        self.store.update_run_status(run_id, RunStatus::Cancelled, None, Some(Utc::now())).await?;
        self.timeline.record(run_id, event_types::RUN_CANCELLED, json!({}), None).await?;

        self.store.get_run(run_id).await?.ok_or(EngineError::RunNotFound(*run_id))
    }

    /// See [`finalize_run`].
    pub async fn finalize(&self, run_id: &RunId) -> Result<Option<RunStatus>, EngineError> {
        finalize_run(&self.store, &self.timeline, run_id).await
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
pub(crate) mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Queue`] trait and job payload types.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;

use fm_core::{JobId, RunId, StepId};

/// Fixed topic names.
pub mod topics {
    /// Materialised steps awaiting a worker lease.
    pub const STEP_READY: &str = "step.ready";
    /// Outbox publications.
    pub const EVENT_OUT: &str = "event.out";
    /// Dead letters from `step.ready`.
    pub const STEP_DLQ: &str = "step.dlq";
}

/// Payload of a `step.ready` job. Field names are a wire contract;
/// unknown fields are preserved and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReady {
    pub run_id: RunId,
    pub step_id: StepId,
    pub idempotency_key: String,
    pub attempt: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl StepReady {
    pub fn new(run_id: RunId, step_id: StepId, idempotency_key: impl Into<String>, attempt: u32) -> Self {
        Self {
            run_id,
            step_id,
            idempotency_key: idempotency_key.into(),
            attempt,
            extra: Default::default(),
        }
    }
}

/// Options for [`Queue::enqueue`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOpts {
    pub delay_ms: u64,
    /// Starting attempt counter (1 when absent).
    pub attempt: Option<u32>,
}

impl EnqueueOpts {
    pub fn delayed(delay_ms: u64) -> Self {
        Self { delay_ms, attempt: None }
    }
}

/// One delivered job.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: JobId,
    pub topic: SmolStr,
    pub payload: Value,
    pub attempt: u32,
}

/// A nack: the delivery failed and should be rescheduled (or dead-lettered
/// once the attempt budget runs out).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Topic consumer. At most one delivery of a given job is in flight until
/// it is acked (Ok) or nacked (Err).
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Delivery) -> Result<(), HandlerError>;
}

/// A job that exhausted its attempt budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub job_id: JobId,
    /// Topic the job was originally enqueued on.
    pub source_topic: String,
    pub payload: Value,
    pub attempts: u32,
    pub last_error: String,
    pub dead_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

/// Topic-keyed, at-least-once job delivery.
///
/// Delivery honours `delay_ms`; a nacked job is rescheduled with a capped
/// exponential delay and routed to the dead-letter topic once
/// [`crate::MAX_ATTEMPTS`] is exceeded.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        opts: EnqueueOpts,
    ) -> Result<JobId, QueueError>;

    /// Register the consumer for `topic`. One consumer per topic per
    /// process.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn JobHandler>)
        -> Result<(), QueueError>;

    /// Whether this process has a consumer for `topic`.
    fn has_subscribers(&self, topic: &str) -> bool;

    /// Age of the oldest undelivered job, for backpressure decisions.
    async fn oldest_age_ms(&self, topic: &str) -> Result<Option<u64>, QueueError>;

    /// Dead letters routed from `dlq_topic` (e.g. `step.dlq`).
    async fn list_dlq(&self, dlq_topic: &str) -> Result<Vec<DlqEntry>, QueueError>;

    /// Move up to `n` dead letters back onto their source topic.
    /// Returns how many were rehydrated.
    async fn rehydrate_dlq(&self, dlq_topic: &str, n: usize) -> Result<usize, QueueError>;

    /// Drop pending (undelivered) `step.ready` jobs for a cancelled step.
    async fn drop_pending_step(&self, step_id: &StepId) -> Result<usize, QueueError>;

    /// Driver identifier ("memory" or "pg"); the engine's inline fallback
    /// applies to the memory driver only.
    fn driver_name(&self) -> &'static str;
}

/// Dead-letter topic fed by `topic`.
pub(crate) fn dlq_topic_for(topic: &str) -> String {
    if topic == topics::STEP_READY {
        topics::STEP_DLQ.to_string()
    } else {
        format!("{topic}.dlq")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_ready_uses_camel_case_wire_names() {
        let payload = StepReady::new(
            RunId::from_string("run-a"),
            StepId::from_string("stp-b"),
            "run-a:s:abc",
            1,
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["runId"], "run-a");
        assert_eq!(value["stepId"], "stp-b");
        assert_eq!(value["idempotencyKey"], "run-a:s:abc");
        assert_eq!(value["attempt"], 1);
    }

    #[test]
    fn step_ready_preserves_unknown_fields() {
        let raw = json!({
            "runId": "run-a",
            "stepId": "stp-b",
            "idempotencyKey": "k",
            "attempt": 2,
            "traceId": "future-field"
        });
        let payload: StepReady = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(payload.extra["traceId"], "future-field");
        // Round-trips with the unknown field intact
        assert_eq!(serde_json::to_value(&payload).unwrap(), raw);
    }

    #[test]
    fn dlq_topic_mapping() {
        assert_eq!(dlq_topic_for(topics::STEP_READY), "step.dlq");
        assert_eq!(dlq_topic_for("event.out"), "event.out.dlq");
    }
}

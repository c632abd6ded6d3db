// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres broker driver: durable, cross-process job delivery.
//!
//! Jobs live in `queue_jobs`; subscriptions poll with
//! `FOR UPDATE SKIP LOCKED` and a visibility timeout, so a crashed worker's
//! jobs redeliver once `locked_until` lapses. Ack deletes the row; nack
//! reschedules with the shared capped-exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

use fm_core::{JobId, StepId};

use crate::backoff::{retry_delay, MAX_ATTEMPTS};
use crate::queue::{
    dlq_topic_for, topics, Delivery, DlqEntry, EnqueueOpts, JobHandler, Queue, QueueError,
};

/// Poll cadence for subscriptions.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Visibility timeout: a claimed job redelivers if not acked in time.
const LOCK_TIMEOUT_SECS: f64 = 120.0;

/// Durable broker over a shared connection pool.
pub struct PgQueue {
    pool: PgPool,
    subscriptions: Mutex<Vec<String>>,
    shutdown: CancellationToken,
}

/// Claim one due job, extending its visibility window.
async fn claim(pool: &PgPool, topic: &str) -> Result<Option<Delivery>, QueueError> {
    let row = sqlx::query(
        "UPDATE queue_jobs SET locked_until = now() + make_interval(secs => $2)
         WHERE id = (
             SELECT id FROM queue_jobs
             WHERE topic = $1 AND available_at <= now()
               AND (locked_until IS NULL OR locked_until < now())
             ORDER BY available_at
             LIMIT 1
             FOR UPDATE SKIP LOCKED
         )
         RETURNING id, payload, attempt",
    )
    .bind(topic)
    .bind(LOCK_TIMEOUT_SECS)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(Delivery {
        id: JobId::from_string(row.try_get::<String, _>("id")?),
        topic: topic.into(),
        payload: row.try_get("payload")?,
        attempt: row.try_get::<i32, _>("attempt")? as u32,
    }))
}

async fn ack(pool: &PgPool, id: &JobId) -> Result<(), QueueError> {
    sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Reschedule a nacked job, or move it to the dead-letter table once the
/// attempt budget is spent.
async fn nack(
    pool: &PgPool,
    topic: &str,
    delivery: &Delivery,
    error: &str,
) -> Result<(), QueueError> {
    if delivery.attempt >= MAX_ATTEMPTS {
        tracing::warn!(
            topic,
            job = %delivery.id,
            attempts = delivery.attempt,
            error,
            "job dead-lettered"
        );
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO queue_dlq (job_id, dlq_topic, source_topic, payload, attempts, last_error)
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING",
        )
        .bind(delivery.id.as_str())
        .bind(dlq_topic_for(topic))
        .bind(topic)
        .bind(&delivery.payload)
        .bind(delivery.attempt as i32)
        .bind(error)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
            .bind(delivery.id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(());
    }
    let delay = retry_delay(delivery.attempt);
    sqlx::query(
        "UPDATE queue_jobs SET attempt = attempt + 1, locked_until = NULL,
             available_at = now() + make_interval(secs => $2)
         WHERE id = $1",
    )
    .bind(delivery.id.as_str())
    .bind(delay.as_secs_f64())
    .execute(pool)
    .await?;
    Ok(())
}

async fn poll_loop(
    pool: PgPool,
    shutdown: CancellationToken,
    topic: String,
    handler: Arc<dyn JobHandler>,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match claim(&pool, &topic).await {
            Ok(Some(delivery)) => {
                let id = delivery.id;
                let outcome = match handler.handle(delivery.clone()).await {
                    Ok(()) => ack(&pool, &id).await,
                    Err(err) => nack(&pool, &topic, &delivery, &err.to_string()).await,
                };
                if let Err(err) = outcome {
                    tracing::error!(topic = %topic, job = %id, error = %err, "queue settle failed");
                }
                // Look for more work right away
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "queue poll failed");
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.cancelled() => break,
        }
    }
}

impl PgQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, subscriptions: Mutex::new(Vec::new()), shutdown: CancellationToken::new() }
    }

    pub async fn connect(database_url: &str) -> Result<Self, QueueError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), QueueError> {
        const DDL: &[&str] = &[
            "CREATE TABLE IF NOT EXISTS queue_jobs (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                payload JSONB NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 1,
                enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                available_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                locked_until TIMESTAMPTZ
            )",
            "CREATE INDEX IF NOT EXISTS queue_jobs_topic_idx
                ON queue_jobs (topic, available_at)",
            "CREATE TABLE IF NOT EXISTS queue_dlq (
                job_id TEXT PRIMARY KEY,
                dlq_topic TEXT NOT NULL,
                source_topic TEXT NOT NULL,
                payload JSONB NOT NULL,
                attempts INTEGER NOT NULL,
                last_error TEXT NOT NULL,
                dead_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        ];
        for ddl in DDL {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Stop poll loops. In-flight handlers finish; their jobs settle.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Queue for PgQueue {
    async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        opts: EnqueueOpts,
    ) -> Result<JobId, QueueError> {
        let id = JobId::new();
        sqlx::query(
            "INSERT INTO queue_jobs (id, topic, payload, attempt, available_at)
             VALUES ($1, $2, $3, $4, now() + make_interval(secs => $5))",
        )
        .bind(id.as_str())
        .bind(topic)
        .bind(&payload)
        .bind(opts.attempt.unwrap_or(1) as i32)
        .bind(opts.delay_ms as f64 / 1_000.0)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), QueueError> {
        self.subscriptions.lock().push(topic.to_string());
        tokio::spawn(poll_loop(
            self.pool.clone(),
            self.shutdown.clone(),
            topic.to_string(),
            handler,
        ));
        Ok(())
    }

    fn has_subscribers(&self, topic: &str) -> bool {
        self.subscriptions.lock().iter().any(|t| t == topic)
    }

    async fn oldest_age_ms(&self, topic: &str) -> Result<Option<u64>, QueueError> {
        let row = sqlx::query(
            "SELECT EXTRACT(EPOCH FROM (now() - MIN(enqueued_at))) * 1000 AS age_ms
             FROM queue_jobs
             WHERE topic = $1 AND (locked_until IS NULL OR locked_until < now())",
        )
        .bind(topic)
        .fetch_one(&self.pool)
        .await?;
        let age: Option<f64> = row.try_get("age_ms")?;
        Ok(age.map(|ms| ms.max(0.0) as u64))
    }

    async fn list_dlq(&self, dlq_topic: &str) -> Result<Vec<DlqEntry>, QueueError> {
        let rows = sqlx::query("SELECT * FROM queue_dlq WHERE dlq_topic = $1 ORDER BY dead_at")
            .bind(dlq_topic)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(DlqEntry {
                    job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
                    source_topic: row.try_get("source_topic")?,
                    payload: row.try_get("payload")?,
                    attempts: row.try_get::<i32, _>("attempts")? as u32,
                    last_error: row.try_get("last_error")?,
                    dead_at: row.try_get("dead_at")?,
                })
            })
            .collect()
    }

    async fn rehydrate_dlq(&self, dlq_topic: &str, n: usize) -> Result<usize, QueueError> {
        let entries = self.list_dlq(dlq_topic).await?;
        let mut moved = 0;
        for entry in entries.into_iter().take(n) {
            self.enqueue(&entry.source_topic, entry.payload, EnqueueOpts::default()).await?;
            sqlx::query("DELETE FROM queue_dlq WHERE job_id = $1")
                .bind(entry.job_id.as_str())
                .execute(&self.pool)
                .await?;
            moved += 1;
        }
        Ok(moved)
    }

    async fn drop_pending_step(&self, step_id: &StepId) -> Result<usize, QueueError> {
        let result = sqlx::query(
            "DELETE FROM queue_jobs
             WHERE topic = $1 AND payload->>'stepId' = $2
               AND (locked_until IS NULL OR locked_until < now())",
        )
        .bind(topics::STEP_READY)
        .bind(step_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    fn driver_name(&self) -> &'static str {
        "pg"
    }
}

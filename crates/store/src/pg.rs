// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres store driver.
//!
//! Runtime `sqlx` queries only (no compile-time macros). Idempotency-key
//! conflicts surface as `Ok(None)`; transient connection failures map to
//! `StoreError::Unavailable`, which callers treat as retryable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use fm_core::{
    artifact_path, Artifact, ArtifactId, ArtifactMeta, EventRecord, Gate, GateId, GateStatus,
    OutboxId, Plan, Run, RunId, RunStatus, Step, StepError, StepId, StepStatus, UserContext,
};

use crate::error::StoreError;
use crate::store::{InboxStatus, NewArtifact, OutboxEntry, Store};

/// Attempts for the gapless sequence allocation when concurrent writers
/// collide on (run_id, seq).
const SEQ_INSERT_ATTEMPTS: u32 = 5;

/// Relational driver over a shared connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Create tables when absent. Deployments that manage schema
    /// externally can skip this.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        const DDL: &[&str] = &[
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                status TEXT NOT NULL,
                plan JSONB NOT NULL,
                user_ctx JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ,
                ended_at TIMESTAMPTZ
            )",
            "CREATE TABLE IF NOT EXISTS steps (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL REFERENCES runs(id),
                name TEXT NOT NULL,
                tool TEXT NOT NULL,
                inputs JSONB NOT NULL,
                status TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ,
                ended_at TIMESTAMPTZ,
                summary JSONB,
                error JSONB
            )",
            "CREATE TABLE IF NOT EXISTS step_idempotency (
                run_id TEXT NOT NULL,
                idem_key TEXT NOT NULL,
                step_id TEXT NOT NULL,
                PRIMARY KEY (run_id, idem_key)
            )",
            "CREATE TABLE IF NOT EXISTS events (
                run_id TEXT NOT NULL,
                seq BIGINT NOT NULL,
                event_type TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                step_id TEXT,
                payload JSONB NOT NULL,
                PRIMARY KEY (run_id, seq)
            )",
            "CREATE TABLE IF NOT EXISTS gates (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                step_id TEXT,
                gate_type TEXT NOT NULL,
                status TEXT NOT NULL,
                approved_by TEXT,
                reason TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                resolved_at TIMESTAMPTZ
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS gates_scope_idx
                ON gates (run_id, COALESCE(step_id, ''), gate_type)",
            "CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                name TEXT NOT NULL,
                mime TEXT NOT NULL,
                path TEXT NOT NULL,
                size BIGINT NOT NULL,
                bytes BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS outbox (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                published_at TIMESTAMPTZ
            )",
            "CREATE TABLE IF NOT EXISTS inbox (
                consumer TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                first_seen_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (consumer, dedup_key)
            )",
        ];
        for ddl in DDL {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(s: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|_| StoreError::Corrupt(format!("bad {what}: {s}")))
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn run_from_row(row: &PgRow) -> Result<Run, StoreError> {
    let status: String = row.try_get("status")?;
    let plan: Value = row.try_get("plan")?;
    let user: Value = row.try_get("user_ctx")?;
    Ok(Run {
        id: RunId::from_string(row.try_get::<String, _>("id")?),
        project_id: row.try_get("project_id")?,
        status: parse_enum::<RunStatus>(&status, "run status")?,
        plan: serde_json::from_value::<Plan>(plan)
            .map_err(|e| StoreError::Corrupt(format!("bad plan: {e}")))?,
        user: serde_json::from_value::<UserContext>(user)
            .map_err(|e| StoreError::Corrupt(format!("bad user context: {e}")))?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn step_from_row(row: &PgRow) -> Result<Step, StoreError> {
    let status: String = row.try_get("status")?;
    let tool: String = row.try_get("tool")?;
    let error: Option<Value> = row.try_get("error")?;
    Ok(Step {
        id: StepId::from_string(row.try_get::<String, _>("id")?),
        run_id: RunId::from_string(row.try_get::<String, _>("run_id")?),
        name: row.try_get("name")?,
        tool: tool.into(),
        inputs: row.try_get("inputs")?,
        status: parse_enum::<StepStatus>(&status, "step status")?,
        idempotency_key: row.try_get("idempotency_key")?,
        attempt: row.try_get::<i32, _>("attempt")? as u32,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        summary: row.try_get("summary")?,
        error: error
            .map(|v| {
                serde_json::from_value::<StepError>(v)
                    .map_err(|e| StoreError::Corrupt(format!("bad step error: {e}")))
            })
            .transpose()?,
    })
}

fn gate_from_row(row: &PgRow) -> Result<Gate, StoreError> {
    let status: String = row.try_get("status")?;
    let gate_type: String = row.try_get("gate_type")?;
    Ok(Gate {
        id: GateId::from_string(row.try_get::<String, _>("id")?),
        run_id: RunId::from_string(row.try_get::<String, _>("run_id")?),
        step_id: row.try_get::<Option<String>, _>("step_id")?.map(StepId::from_string),
        gate_type: gate_type.into(),
        status: parse_enum::<GateStatus>(&status, "gate status")?,
        approved_by: row.try_get("approved_by")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<EventRecord, StoreError> {
    let event_type: String = row.try_get("event_type")?;
    Ok(EventRecord {
        run_id: RunId::from_string(row.try_get::<String, _>("run_id")?),
        seq: row.try_get::<i64, _>("seq")? as u64,
        event_type: event_type.into(),
        occurred_at: row.try_get("occurred_at")?,
        step_id: row.try_get::<Option<String>, _>("step_id")?.map(StepId::from_string),
        payload: row.try_get("payload")?,
    })
}

fn artifact_from_row(row: &PgRow) -> Result<Artifact, StoreError> {
    Ok(Artifact {
        id: ArtifactId::from_string(row.try_get::<String, _>("id")?),
        run_id: RunId::from_string(row.try_get::<String, _>("run_id")?),
        step_id: StepId::from_string(row.try_get::<String, _>("step_id")?),
        name: row.try_get("name")?,
        mime: row.try_get("mime")?,
        path: row.try_get("path")?,
        meta: ArtifactMeta {
            driver: Some("pg".to_string()),
            size: Some(row.try_get::<i64, _>("size")? as u64),
        },
        created_at: row.try_get("created_at")?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxEntry, StoreError> {
    Ok(OutboxEntry {
        id: OutboxId::from_string(row.try_get::<String, _>("id")?),
        topic: row.try_get("topic")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
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
        sqlx::query(
            "INSERT INTO runs (id, project_id, status, plan, user_ctx, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(run.id.as_str())
        .bind(&run.project_id)
        .bind(run.status.to_string())
        .bind(serde_json::to_value(&run.plan)?)
        .bind(serde_json::to_value(&run.user)?)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(
        &self,
        limit: usize,
        project_id: Option<&str>,
    ) -> Result<Vec<Run>, StoreError> {
        let rows = match project_id {
            Some(project) => {
                sqlx::query(
                    "SELECT * FROM runs WHERE project_id = $1
                     ORDER BY created_at DESC LIMIT $2",
                )
                .bind(project)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM runs ORDER BY created_at DESC LIMIT $1")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(run_from_row).collect()
    }

    async fn update_run_status(
        &self,
        id: &RunId,
        status: RunStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE runs SET status = $2,
                 started_at = COALESCE($3, started_at),
                 ended_at = COALESCE($4, ended_at)
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(started_at)
        .bind(ended_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound(*id));
        }
        Ok(())
    }

    async fn create_step(
        &self,
        run_id: &RunId,
        name: &str,
        tool: &str,
        inputs: Value,
        idem_key: &str,
    ) -> Result<Option<Step>, StoreError> {
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

        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "INSERT INTO step_idempotency (run_id, idem_key, step_id)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(run_id.as_str())
        .bind(idem_key)
        .bind(step.id.as_str())
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        sqlx::query(
            "INSERT INTO steps (id, run_id, name, tool, inputs, status, idempotency_key,
                                attempt, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(step.id.as_str())
        .bind(run_id.as_str())
        .bind(&step.name)
        .bind(tool)
        .bind(&step.inputs)
        .bind(step.status.to_string())
        .bind(idem_key)
        .bind(step.attempt as i32)
        .bind(step.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(step))
    }

    async fn get_step_by_idempotency_key(
        &self,
        run_id: &RunId,
        key: &str,
    ) -> Result<Option<Step>, StoreError> {
        let row = sqlx::query(
            "SELECT s.* FROM steps s
             JOIN step_idempotency i ON i.step_id = s.id
             WHERE i.run_id = $1 AND i.idem_key = $2",
        )
        .bind(run_id.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(step_from_row).transpose()
    }

    async fn get_step(&self, id: &StepId) -> Result<Option<Step>, StoreError> {
        let row = sqlx::query("SELECT * FROM steps WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(step_from_row).transpose()
    }

    async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE steps SET status = $2, attempt = $3, started_at = $4, ended_at = $5,
                 summary = $6, error = $7
             WHERE id = $1",
        )
        .bind(step.id.as_str())
        .bind(step.status.to_string())
        .bind(step.attempt as i32)
        .bind(step.started_at)
        .bind(step.ended_at)
        .bind(&step.summary)
        .bind(step.error.as_ref().map(serde_json::to_value).transpose()?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::StepNotFound(step.id));
        }
        Ok(())
    }

    async fn lease_step(
        &self,
        id: &StepId,
        from: StepStatus,
        to: StepStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE steps SET status = $2,
                 started_at = CASE WHEN $2 = 'running' AND started_at IS NULL
                                   THEN now() ELSE started_at END,
                 ended_at = CASE WHEN $2 IN ('succeeded', 'failed', 'cancelled')
                                 THEN now() ELSE ended_at END
             WHERE id = $1 AND status = $3",
        )
        .bind(id.as_str())
        .bind(to.to_string())
        .bind(from.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists = sqlx::query("SELECT 1 FROM steps WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::StepNotFound(*id));
        }
        Ok(false)
    }

    async fn reset_step(&self, id: &StepId) -> Result<Step, StoreError> {
        let row = sqlx::query(
            "UPDATE steps SET status = 'queued', attempt = attempt + 1,
                 error = NULL, started_at = NULL, ended_at = NULL
             WHERE id = $1 RETURNING *",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => step_from_row(&row),
            None => Err(StoreError::StepNotFound(*id)),
        }
    }

    async fn list_steps_by_run(&self, run_id: &RunId) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query("SELECT * FROM steps WHERE run_id = $1 ORDER BY created_at")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(step_from_row).collect()
    }

    async fn count_remaining_steps(&self, run_id: &RunId) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS remaining FROM steps
             WHERE run_id = $1 AND status IN ('queued', 'running', 'awaiting_gate')",
        )
        .bind(run_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("remaining")? as u64)
    }

    async fn record_event(
        &self,
        run_id: &RunId,
        event_type: &str,
        payload: Value,
        step_id: Option<&StepId>,
    ) -> Result<u64, StoreError> {
        // MAX(seq)+1 keeps sequences gapless; retry on the rare concurrent
        // collision of (run_id, seq).
        for _ in 0..SEQ_INSERT_ATTEMPTS {
            let result = sqlx::query(
                "INSERT INTO events (run_id, seq, event_type, occurred_at, step_id, payload)
                 SELECT $1, COALESCE(MAX(seq), 0) + 1, $2, now(), $3, $4
                 FROM events WHERE run_id = $1
                 RETURNING seq",
            )
            .bind(run_id.as_str())
            .bind(event_type)
            .bind(step_id.map(|s| s.as_str()))
            .bind(&payload)
            .fetch_one(&self.pool)
            .await;
            match result {
                Ok(row) => return Ok(row.try_get::<i64, _>("seq")? as u64),
                Err(err) if unique_violation(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Unavailable("event sequence contention".to_string()))
    }

    async fn list_events(
        &self,
        run_id: &RunId,
        since_seq: Option<u64>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE run_id = $1 AND seq > $2 ORDER BY seq",
        )
        .bind(run_id.as_str())
        .bind(since_seq.unwrap_or(0) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn create_or_get_gate(
        &self,
        run_id: &RunId,
        step_id: Option<&StepId>,
        gate_type: &str,
    ) -> Result<(Gate, bool), StoreError> {
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
        let inserted = sqlx::query(
            "INSERT INTO gates (id, run_id, step_id, gate_type, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (run_id, COALESCE(step_id, ''), gate_type) DO NOTHING",
        )
        .bind(gate.id.as_str())
        .bind(run_id.as_str())
        .bind(step_id.map(|s| s.as_str()))
        .bind(gate_type)
        .bind(gate.status.to_string())
        .bind(gate.created_at)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() > 0 {
            return Ok((gate, true));
        }
        let row = sqlx::query(
            "SELECT * FROM gates
             WHERE run_id = $1 AND step_id IS NOT DISTINCT FROM $2 AND gate_type = $3",
        )
        .bind(run_id.as_str())
        .bind(step_id.map(|s| s.as_str()))
        .bind(gate_type)
        .fetch_one(&self.pool)
        .await?;
        Ok((gate_from_row(&row)?, false))
    }

    async fn get_gate(&self, id: &GateId) -> Result<Option<Gate>, StoreError> {
        let row = sqlx::query("SELECT * FROM gates WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(gate_from_row).transpose()
    }

    async fn update_gate(&self, gate: &Gate) -> Result<(), StoreError> {
        // Terminal gates are immutable; the status guard makes repeated
        // resolutions a no-op.
        let result = sqlx::query(
            "UPDATE gates SET status = $2, approved_by = $3, reason = $4, resolved_at = $5
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(gate.id.as_str())
        .bind(gate.status.to_string())
        .bind(&gate.approved_by)
        .bind(&gate.reason)
        .bind(gate.resolved_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM gates WHERE id = $1")
                .bind(gate.id.as_str())
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(StoreError::GateNotFound(gate.id));
            }
        }
        Ok(())
    }

    async fn list_gates_by_run(&self, run_id: &RunId) -> Result<Vec<Gate>, StoreError> {
        let rows = sqlx::query("SELECT * FROM gates WHERE run_id = $1 ORDER BY created_at")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(gate_from_row).collect()
    }

    async fn count_pending_gates(&self, run_id: &RunId) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending FROM gates WHERE run_id = $1 AND status = 'pending'",
        )
        .bind(run_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("pending")? as u64)
    }

    async fn add_artifact(
        &self,
        artifact: NewArtifact<'_>,
        bytes: &[u8],
    ) -> Result<Artifact, StoreError> {
        let record = Artifact {
            id: ArtifactId::new(),
            run_id: *artifact.run_id,
            step_id: *artifact.step_id,
            name: artifact.name.to_string(),
            mime: artifact.mime.to_string(),
            path: artifact_path(artifact.run_id, artifact.step_id, artifact.name),
            meta: ArtifactMeta { driver: Some("pg".to_string()), size: Some(bytes.len() as u64) },
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO artifacts (id, run_id, step_id, name, mime, path, size, bytes, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id.as_str())
        .bind(record.run_id.as_str())
        .bind(record.step_id.as_str())
        .bind(&record.name)
        .bind(&record.mime)
        .bind(&record.path)
        .bind(bytes.len() as i64)
        .bind(bytes)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_artifacts_by_run(&self, run_id: &RunId) -> Result<Vec<Artifact>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, run_id, step_id, name, mime, path, size, created_at
             FROM artifacts WHERE run_id = $1 ORDER BY created_at",
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(artifact_from_row).collect()
    }

    async fn read_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>, StoreError> {
        let row = sqlx::query("SELECT bytes FROM artifacts WHERE id = $1")
            .bind(artifact.id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<Vec<u8>, _>("bytes")?),
            None => Err(StoreError::Corrupt(format!("artifact bytes missing: {}", artifact.id))),
        }
    }

    async fn put_outbox(&self, topic: &str, payload: Value) -> Result<OutboxId, StoreError> {
        let id = OutboxId::new();
        sqlx::query(
            "INSERT INTO outbox (id, topic, payload, created_at) VALUES ($1, $2, $3, now())",
        )
        .bind(id.as_str())
        .bind(topic)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn take_unpublished_outbox(
        &self,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM outbox WHERE published_at IS NULL ORDER BY created_at LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_outbox_published(&self, id: &OutboxId) -> Result<(), StoreError> {
        sqlx::query("UPDATE outbox SET published_at = now() WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn inbox_seen(
        &self,
        consumer: &str,
        dedup_key: &str,
    ) -> Result<InboxStatus, StoreError> {
        let result = sqlx::query(
            "INSERT INTO inbox (consumer, dedup_key, first_seen_at)
             VALUES ($1, $2, now()) ON CONFLICT DO NOTHING",
        )
        .bind(consumer)
        .bind(dedup_key)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            Ok(InboxStatus::Fresh)
        } else {
            Ok(InboxStatus::Duplicate)
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One method per route. Transport adapters call these and translate
//! [`crate::ApiError`] into status codes.

use std::sync::Arc;

use fm_core::{EventRecord, GateId, Plan, Run, RunId, StepId, UserContext};
use fm_engine::{GateResolution, RunEngine};
use fm_store::Store;

use crate::dto::{
    CreateGateRequest, CreateRunRequest, CreateRunResponse, GateDto, Pagination,
    ResolveGateRequest, RunDetail, RunsPage,
};
use crate::error::ApiError;
use crate::plan_builder::{PlanBuilder, StandardPlanBuilder};
use crate::stream::RunStream;

const LIST_LIMIT_DEFAULT: usize = 20;
const LIST_LIMIT_MAX: usize = 100;

/// The API facade over the engine.
pub struct Api {
    engine: Arc<RunEngine>,
    builder: Arc<dyn PlanBuilder>,
}

impl Api {
    pub fn new(engine: Arc<RunEngine>) -> Self {
        Self { engine, builder: Arc::new(StandardPlanBuilder) }
    }

    pub fn with_builder(engine: Arc<RunEngine>, builder: Arc<dyn PlanBuilder>) -> Self {
        Self { engine, builder }
    }

    pub fn engine(&self) -> &Arc<RunEngine> {
        &self.engine
    }

    fn resolve_plan(&self, request: &CreateRunRequest) -> Result<Plan, ApiError> {
        match (&request.plan, &request.standard) {
            (Some(plan), _) => {
                if plan.steps.is_empty() {
                    return Err(ApiError::Validation("plan.steps must not be empty".to_string()));
                }
                Ok(plan.clone())
            }
            (None, Some(standard)) => {
                if standard.prompt.trim().is_empty() {
                    return Err(ApiError::Validation("standard.prompt is required".to_string()));
                }
                Ok(self.builder.build(standard))
            }
            (None, None) => Err(ApiError::Validation("plan or standard is required".to_string())),
        }
    }

    /// `POST /runs` — responds before steps materialise.
    pub async fn create_run(
        &self,
        request: CreateRunRequest,
        user: Option<UserContext>,
    ) -> Result<CreateRunResponse, ApiError> {
        let user = user.ok_or(ApiError::Unauthorized)?;
        let plan = self.resolve_plan(&request)?;
        let project_id = request.project_id.as_deref().unwrap_or("default");

        let run = self.engine.create_run(plan, project_id, user).await?;
        Ok(CreateRunResponse {
            id: run.id.to_string(),
            status: run.status,
            project_id: run.project_id,
        })
    }

    /// `POST /runs/preview` — the generated plan, nothing persisted.
    pub fn preview(&self, request: CreateRunRequest) -> Result<Plan, ApiError> {
        self.resolve_plan(&request)
    }

    /// `GET /runs` — limit clamped to [1, 100], default 20.
    pub async fn list_runs(
        &self,
        limit: Option<usize>,
        project_id: Option<&str>,
    ) -> Result<RunsPage, ApiError> {
        let limit = limit.unwrap_or(LIST_LIMIT_DEFAULT).clamp(1, LIST_LIMIT_MAX);
        let runs = self.engine.store().list_runs(limit, project_id).await?;
        let count = runs.len();
        Ok(RunsPage { runs, pagination: Pagination { limit, count } })
    }

    /// `GET /runs/:id`.
    pub async fn get_run(&self, id: &str) -> Result<RunDetail, ApiError> {
        let run_id = RunId::from_string(id);
        let Some(run) = self.engine.store().get_run(&run_id).await? else {
            return Err(ApiError::NotFound);
        };
        let steps = self.engine.store().list_steps_by_run(&run_id).await?;
        let artifacts = self.engine.store().list_artifacts_by_run(&run_id).await?;
        Ok(RunDetail { run, steps, artifacts })
    }

    /// `GET /runs/:id/timeline`.
    pub async fn timeline(&self, id: &str) -> Result<Vec<EventRecord>, ApiError> {
        let run_id = RunId::from_string(id);
        if self.engine.store().get_run(&run_id).await?.is_none() {
            return Err(ApiError::NotFound);
        }
        Ok(self.engine.timeline().replay(&run_id, None).await?)
    }

    /// `GET /runs/:id/stream` — connected event, pings, live push.
    pub async fn stream(&self, id: &str) -> Result<RunStream, ApiError> {
        let run_id = RunId::from_string(id);
        if self.engine.store().get_run(&run_id).await?.is_none() {
            return Err(ApiError::NotFound);
        }
        Ok(RunStream::open(self.engine.timeline().clone(), run_id))
    }

    /// `POST /runs/:id/cancel`.
    pub async fn cancel_run(&self, id: &str) -> Result<Run, ApiError> {
        Ok(self.engine.cancel_run(&RunId::from_string(id)).await?)
    }

    /// `POST /runs/:runId/steps/:stepId/retry`.
    pub async fn retry_step(&self, run_id: &str, step_id: &str) -> Result<RunDetail, ApiError> {
        self.engine
            .retry_step(&RunId::from_string(run_id), &StepId::from_string(step_id))
            .await?;
        self.get_run(run_id).await
    }

    /// `POST /gates`.
    pub async fn create_gate(&self, request: CreateGateRequest) -> Result<GateDto, ApiError> {
        if request.gate_type.trim().is_empty() {
            return Err(ApiError::Validation("gate_type is required".to_string()));
        }
        let run_id = RunId::from_string(&request.run_id);
        if self.engine.store().get_run(&run_id).await?.is_none() {
            return Err(ApiError::NotFound);
        }
        // An empty step_id means a run-level gate
        let step_id = request.step_id.as_deref().filter(|s| !s.is_empty()).map(StepId::from_string);
        Ok(self.engine.create_gate(&run_id, step_id.as_ref(), &request.gate_type).await?)
    }

    /// `POST /gates/:id/approve`.
    pub async fn approve_gate(
        &self,
        gate_id: &str,
        request: ResolveGateRequest,
    ) -> Result<GateDto, ApiError> {
        self.resolve(gate_id, GateResolution::Approve, request).await
    }

    /// `POST /gates/:id/waive`.
    pub async fn waive_gate(
        &self,
        gate_id: &str,
        request: ResolveGateRequest,
    ) -> Result<GateDto, ApiError> {
        self.resolve(gate_id, GateResolution::Waive, request).await
    }

    /// `POST /gates/:id/reject`.
    pub async fn reject_gate(
        &self,
        gate_id: &str,
        request: ResolveGateRequest,
    ) -> Result<GateDto, ApiError> {
        self.resolve(gate_id, GateResolution::Reject, request).await
    }

    async fn resolve(
        &self,
        gate_id: &str,
        resolution: GateResolution,
        request: ResolveGateRequest,
    ) -> Result<GateDto, ApiError> {
        let gate = self
            .engine
            .resolve_gate(
                &GateId::from_string(gate_id),
                resolution,
                request.approved_by.as_deref(),
                request.reason.as_deref(),
            )
            .await?;
        Ok(gate)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response DTOs for the route surface.

use serde::{Deserialize, Serialize};

use fm_core::{Artifact, Gate, Plan, Run, RunStatus, Step};

/// Body of `POST /runs`: either a literal plan or a standard-mode request
/// handed to the plan builder.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRunRequest {
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub standard: Option<StandardRequest>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Standard mode: a natural-language prompt plus options.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardRequest {
    pub prompt: String,
    /// Output filename for the generated artifact.
    #[serde(default)]
    pub filename: Option<String>,
    /// Inject quality check gates after generation.
    #[serde(default)]
    pub quality: bool,
    /// Require a manual approval before any other step runs.
    #[serde(default)]
    pub approval: bool,
}

/// `201` body of `POST /runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunResponse {
    pub id: String,
    pub status: RunStatus,
    #[serde(rename = "projectId")]
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub count: usize,
}

/// `GET /runs` body.
#[derive(Debug, Clone, Serialize)]
pub struct RunsPage {
    pub runs: Vec<Run>,
    pub pagination: Pagination,
}

/// `GET /runs/:id` body.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub run: Run,
    pub steps: Vec<Step>,
    pub artifacts: Vec<Artifact>,
}

/// Body of `POST /gates`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGateRequest {
    pub run_id: String,
    /// Empty or absent means a run-level gate.
    #[serde(default)]
    pub step_id: Option<String>,
    pub gate_type: String,
}

/// Body of gate approve/waive/reject.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveGateRequest {
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Gate as returned by the API.
pub type GateDto = Gate;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_run_response_uses_camel_project_id() {
        let body = CreateRunResponse {
            id: "run-a".to_string(),
            status: RunStatus::Queued,
            project_id: "proj-a".to_string(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({"id": "run-a", "status": "queued", "projectId": "proj-a"}));
    }

    #[test]
    fn create_gate_request_accepts_empty_step_id() {
        let req: CreateGateRequest =
            serde_json::from_value(json!({"run_id": "run-a", "gate_type": "manual-approval"}))
                .unwrap();
        assert!(req.step_id.is_none());
    }

    #[test]
    fn standard_request_defaults() {
        let req: StandardRequest = serde_json::from_value(json!({"prompt": "write docs"})).unwrap();
        assert!(!req.quality);
        assert!(!req.approval);
        assert!(req.filename.is_none());
    }
}

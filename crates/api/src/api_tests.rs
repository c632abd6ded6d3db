// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::dto::{CreateGateRequest, CreateRunRequest, ResolveGateRequest, StandardRequest};
use fm_core::test_support::{sample_plan, test_user};
use fm_core::{GateStatus, StepStatus};
use fm_engine::EngineConfig;
use fm_queue::MemoryQueue;
use fm_store::FsStore;

struct Bed {
    _dir: tempfile::TempDir,
    api: Api,
}

/// Engine-only bed: no worker, inline runner disabled, so steps stay
/// queued and route behaviour is observable in isolation.
fn bed() -> Bed {
    let dir = tempfile::tempdir().unwrap();
    let store: std::sync::Arc<dyn fm_store::Store> =
        std::sync::Arc::new(FsStore::open(dir.path()).unwrap());
    let queue: std::sync::Arc<dyn fm_queue::Queue> = std::sync::Arc::new(MemoryQueue::new());
    let engine = fm_engine::RunEngine::new(
        store,
        queue,
        EngineConfig { disable_inline_runner: true, ..Default::default() },
    );
    Bed { _dir: dir, api: Api::new(engine) }
}

fn plan_request() -> CreateRunRequest {
    CreateRunRequest { plan: Some(sample_plan()), ..Default::default() }
}

async fn wait_for_step(api: &Api, run_id: &str) -> fm_core::Step {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let detail = api.get_run(run_id).await.unwrap();
        if let Some(step) = detail.steps.first() {
            return step.clone();
        }
        assert!(std::time::Instant::now() < deadline, "steps never materialised");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn create_run_requires_auth() {
    let bed = bed();
    let err = bed.api.create_run(plan_request(), None).await.unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn create_run_requires_plan_or_standard() {
    let bed = bed();
    let err = bed
        .api
        .create_run(CreateRunRequest::default(), Some(test_user()))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn create_run_responds_queued_before_steps_exist() {
    let bed = bed();
    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    assert_eq!(response.status, fm_core::RunStatus::Queued);
    assert_eq!(response.project_id, "default");

    // Materialisation catches up in the background
    let step = wait_for_step(&bed.api, &response.id).await;
    assert_eq!(step.status, StepStatus::Queued);
}

#[tokio::test]
async fn preview_builds_without_persisting() {
    let bed = bed();
    let plan = bed
        .api
        .preview(CreateRunRequest {
            standard: Some(StandardRequest {
                prompt: "write a haiku".to_string(),
                filename: Some("haiku.md".to_string()),
                quality: false,
                approval: false,
            }),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(plan.steps.len(), 1);

    let page = bed.api.list_runs(None, None).await.unwrap();
    assert_eq!(page.runs.len(), 0, "preview must not persist a run");
}

#[tokio::test]
async fn list_runs_clamps_limit() {
    let bed = bed();
    for _ in 0..3 {
        bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    }

    let page = bed.api.list_runs(Some(0), None).await.unwrap();
    assert_eq!(page.pagination.limit, 1);
    assert_eq!(page.runs.len(), 1);

    let page = bed.api.list_runs(Some(10_000), None).await.unwrap();
    assert_eq!(page.pagination.limit, 100);

    let page = bed.api.list_runs(None, None).await.unwrap();
    assert_eq!(page.pagination.limit, 20);
    assert_eq!(page.pagination.count, 3);
}

#[tokio::test]
async fn get_run_404s_for_unknown_id() {
    let bed = bed();
    let err = bed.api.get_run("run-missing").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = bed.api.timeline("run-missing").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = bed.api.stream("run-missing").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn timeline_is_ordered() {
    let bed = bed();
    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    wait_for_step(&bed.api, &response.id).await;

    let events = bed.api.timeline(&response.id).await.unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
    assert_eq!(events[0].event_type, "run.created");
}

#[tokio::test]
async fn run_level_gate_roundtrip() {
    let bed = bed();
    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();

    let gate = bed
        .api
        .create_gate(CreateGateRequest {
            run_id: response.id.clone(),
            step_id: None,
            gate_type: "manual-approval".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(gate.status, GateStatus::Pending);
    assert!(gate.step_id.is_none());

    let approved = bed
        .api
        .approve_gate(
            &gate.id.to_string(),
            ResolveGateRequest {
                approved_by: Some("op".to_string()),
                reason: Some("looks good".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.status, GateStatus::Approved);

    // Second approval is a no-op success
    let again = bed
        .api
        .approve_gate(&gate.id.to_string(), ResolveGateRequest::default())
        .await
        .unwrap();
    assert_eq!(again.status, GateStatus::Approved);
    assert_eq!(again.approved_by.as_deref(), Some("op"));
}

#[tokio::test]
async fn gate_creation_validates() {
    let bed = bed();
    let err = bed
        .api
        .create_gate(CreateGateRequest {
            run_id: "run-missing".to_string(),
            step_id: None,
            gate_type: "manual-approval".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    let err = bed
        .api
        .create_gate(CreateGateRequest {
            run_id: response.id,
            step_id: None,
            gate_type: "  ".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn empty_step_id_means_run_level_gate() {
    let bed = bed();
    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    let gate = bed
        .api
        .create_gate(CreateGateRequest {
            run_id: response.id,
            step_id: Some(String::new()),
            gate_type: "typecheck".to_string(),
        })
        .await
        .unwrap();
    assert!(gate.step_id.is_none());
}

#[tokio::test]
async fn retry_endpoint_maps_engine_errors() {
    let bed = bed();
    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    let step = wait_for_step(&bed.api, &response.id).await;

    // Queued step: not retryable → 400
    let err = bed.api.retry_step(&response.id, &step.id.to_string()).await.unwrap_err();
    assert_eq!(err.status_code(), 400);

    // Unknown step → 404
    let err = bed.api.retry_step(&response.id, "stp-missing").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn cancel_run_via_api() {
    let bed = bed();
    let response = bed.api.create_run(plan_request(), Some(test_user())).await.unwrap();
    wait_for_step(&bed.api, &response.id).await;

    let run = bed.api.cancel_run(&response.id).await.unwrap();
    assert_eq!(run.status, fm_core::RunStatus::Cancelled);
}

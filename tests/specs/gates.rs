// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual gates block a run and release on approval.

use crate::prelude::*;

fn gated_plan() -> Plan {
    Plan {
        goal: "deploy".into(),
        steps: vec![
            PlanStep::new("approval", "manual:deploy"),
            PlanStep::new("write readme", "codegen")
                .inputs(json!({"topic": "Testing", "filename": "haiku.md"})),
        ],
    }
}

#[tokio::test]
async fn pending_gate_blocks_and_approval_releases() {
    let plane = start_plane().await;

    let response = plane.api.create_run(plan_request(gated_plan()), spec_user()).await.unwrap();
    wait_run_status(&plane.api, &response.id, RunStatus::Blocked).await;

    // The gate is pending and the codegen step has not started
    let detail = plane.api.get_run(&response.id).await.unwrap();
    let approval = detail.steps.iter().find(|s| s.name == "approval").unwrap();
    assert_eq!(approval.status, StepStatus::AwaitingGate);
    let codegen = detail.steps.iter().find(|s| s.name == "write readme").unwrap();
    assert_eq!(codegen.status, StepStatus::Queued, "subsequent steps must not start");
    assert!(detail.artifacts.is_empty());

    let gates = plane.engine.store().list_gates_by_run(&detail.run.id).await.unwrap();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].status, GateStatus::Pending);
    assert_eq!(gates[0].gate_type, "manual-approval");

    // Operator approves through the API
    let approved = plane
        .api
        .approve_gate(
            &gates[0].id.to_string(),
            ResolveGateRequest {
                approved_by: Some("release-manager".to_string()),
                reason: Some("go".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.status, GateStatus::Approved);

    // The run unblocks and finishes both steps
    wait_run_status(&plane.api, &response.id, RunStatus::Succeeded).await;
    let detail = plane.api.get_run(&response.id).await.unwrap();
    assert!(detail.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    assert_eq!(detail.artifacts.len(), 1);

    let events = timeline_types(&plane.api, &response.id).await;
    assert_subsequence(&events, &["gate.created", "gate.approved", "run.succeeded"]);
}

#[tokio::test]
async fn rejection_fails_step_and_run() {
    let plane = start_plane().await;

    let response = plane.api.create_run(plan_request(gated_plan()), spec_user()).await.unwrap();
    wait_run_status(&plane.api, &response.id, RunStatus::Blocked).await;

    let gates = plane.engine.store().list_gates_by_run(&plane.api.get_run(&response.id).await.unwrap().run.id).await.unwrap();
    plane
        .api
        .reject_gate(
            &gates[0].id.to_string(),
            ResolveGateRequest { approved_by: Some("op".to_string()), reason: Some("unsafe".to_string()) },
        )
        .await
        .unwrap();

    // The rejected step fails; remaining steps still drain; the run
    // settles failed
    wait_run_status(&plane.api, &response.id, RunStatus::Failed).await;

    let detail = plane.api.get_run(&response.id).await.unwrap();
    let approval = detail.steps.iter().find(|s| s.name == "approval").unwrap();
    assert_eq!(approval.status, StepStatus::Failed);

    let events = timeline_types(&plane.api, &response.id).await;
    assert!(events.contains(&"gate.rejected".to_string()));
}

#[tokio::test]
async fn waive_releases_like_approve() {
    let plane = start_plane().await;

    let response = plane.api.create_run(plan_request(gated_plan()), spec_user()).await.unwrap();
    wait_run_status(&plane.api, &response.id, RunStatus::Blocked).await;

    let run_id = plane.api.get_run(&response.id).await.unwrap().run.id;
    let gates = plane.engine.store().list_gates_by_run(&run_id).await.unwrap();
    plane
        .api
        .waive_gate(&gates[0].id.to_string(), ResolveGateRequest::default())
        .await
        .unwrap();

    wait_run_status(&plane.api, &response.id, RunStatus::Succeeded).await;
}

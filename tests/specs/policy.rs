// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step policy enforcement.

use crate::prelude::*;

#[tokio::test]
async fn step_denied_by_tools_allowed_fails_the_run() {
    let plane = start_plane().await;

    let plan = Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("deny me", "codegen")
            .tools_allowed(vec!["git_pr".to_string()])],
    };
    let response = plane.api.create_run(plan_request(plan), spec_user()).await.unwrap();

    wait_run_status(&plane.api, &response.id, RunStatus::Failed).await;

    let detail = plane.api.get_run(&response.id).await.unwrap();
    assert_eq!(detail.steps[0].status, StepStatus::Failed);
    let error = detail.steps[0].error.as_ref().unwrap();
    assert_eq!(error.kind, fm_core::StepErrorKind::PolicyDenied);

    let events = timeline_types(&plane.api, &response.id).await;
    assert!(events.contains(&"policy.denied".to_string()));
    assert!(!events.contains(&"step.succeeded".to_string()), "the tool never ran");
}

#[tokio::test]
async fn allowed_tool_passes_policy() {
    let plane = start_plane().await;

    let plan = Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("allowed", "codegen")
            .inputs(json!({"topic": "ok", "filename": "ok.md"}))
            .tools_allowed(vec!["codegen".to_string()])],
    };
    let response = plane.api.create_run(plan_request(plan), spec_user()).await.unwrap();
    wait_run_status(&plane.api, &response.id, RunStatus::Succeeded).await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy path: one codegen step from POST to artifact.

use crate::prelude::*;

fn readme_plan() -> Plan {
    Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("write readme", "codegen")
            .inputs(json!({"topic": "Testing", "filename": "haiku.md"}))],
    }
}

#[tokio::test]
async fn run_completes_with_artifact_and_full_timeline() {
    let plane = start_plane().await;

    let response = plane.api.create_run(plan_request(readme_plan()), spec_user()).await.unwrap();
    assert_eq!(response.status, RunStatus::Queued, "create responds before steps run");

    wait_run_status(&plane.api, &response.id, RunStatus::Succeeded).await;

    let events = timeline_types(&plane.api, &response.id).await;
    assert_subsequence(
        &events,
        &["run.created", "step.enqueued", "step.started", "step.succeeded", "run.succeeded"],
    );

    let detail = plane.api.get_run(&response.id).await.unwrap();
    assert_eq!(detail.steps.len(), 1);
    assert_eq!(detail.steps[0].status, StepStatus::Succeeded);
    assert_eq!(detail.artifacts.len(), 1);
    assert_eq!(detail.artifacts[0].name, "haiku.md");
    assert_eq!(detail.artifacts[0].mime, "text/markdown");
    assert_eq!(
        detail.artifacts[0].path,
        format!("runs/{}/steps/{}/haiku.md", detail.run.id, detail.steps[0].id)
    );
}

#[tokio::test]
async fn inline_fallback_completes_without_a_worker() {
    // No subscriber: the engine falls back to the runner inline
    let plane = start_plane_with(PlaneOptions {
        subscribe_worker: false,
        ..Default::default()
    })
    .await;

    let response = plane.api.create_run(plan_request(readme_plan()), spec_user()).await.unwrap();
    wait_run_status(&plane.api, &response.id, RunStatus::Succeeded).await;

    let detail = plane.api.get_run(&response.id).await.unwrap();
    assert_eq!(detail.artifacts.len(), 1);
}

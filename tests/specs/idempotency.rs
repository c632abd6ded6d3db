// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplicate materialisation and duplicate job delivery collapse onto a
//! single step execution.

use crate::prelude::*;
use fm_queue::{topics, EnqueueOpts, StepReady};

#[tokio::test]
async fn duplicate_materialisation_and_delivery_execute_once() {
    let plane = start_plane().await;

    let plan = Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("write readme", "codegen")
            .inputs(json!({"topic": "Testing", "filename": "haiku.md"}))],
    };
    let response = plane.api.create_run(plan_request(plan), spec_user()).await.unwrap();
    wait_run_status(&plane.api, &response.id, RunStatus::Succeeded).await;

    // Simulate a second materialisation of the same plan
    let detail = plane.api.get_run(&response.id).await.unwrap();
    plane.engine.materialise_steps(&detail.run).await.unwrap();

    // And a duplicate queue delivery of the settled step
    let step = &detail.steps[0];
    let duplicate = StepReady::new(
        detail.run.id,
        step.id,
        step.idempotency_key.clone(),
        step.attempt,
    );
    plane
        .queue
        .enqueue(
            topics::STEP_READY,
            serde_json::to_value(&duplicate).unwrap(),
            EnqueueOpts::default(),
        )
        .await
        .unwrap();

    // Give the duplicates time to flow through
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let detail = plane.api.get_run(&response.id).await.unwrap();
    assert_eq!(detail.steps.len(), 1, "exactly one step row");

    let events = timeline_types(&plane.api, &response.id).await;
    let enqueued = events.iter().filter(|e| *e == "step.enqueued").count();
    let succeeded = events.iter().filter(|e| *e == "step.succeeded").count();
    assert!(enqueued <= 2, "at most two step.enqueued events, saw {enqueued}");
    assert_eq!(succeeded, 1, "exactly one step.succeeded");
    // The duplicate delivery lost its lease instead of re-running
    assert!(events.iter().any(|e| e == "step.enqueue.skipped" || e == "step.lease.lost"));
}

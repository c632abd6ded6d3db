// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backpressure: a saturated queue delays new step admissions.

use crate::prelude::*;
use fm_queue::{topics, EnqueueOpts};

#[tokio::test]
async fn saturated_queue_records_backpressure_and_delays_enqueue() {
    // No worker: pending jobs age; tight threshold so the spec stays fast
    let plane = start_plane_with(PlaneOptions {
        engine_config: EngineConfig {
            backpressure_age_ms: 100,
            disable_inline_runner: true,
        },
        subscribe_worker: false,
        ..Default::default()
    })
    .await;

    // Age the queue past the threshold
    plane
        .queue
        .enqueue(topics::STEP_READY, json!({"stepId": "stp-parked"}), EnqueueOpts::default())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let plan = Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("late arrival", "codegen").inputs(json!({"topic": "x"}))],
    };
    let response = plane.api.create_run(plan_request(plan), spec_user()).await.unwrap();

    // Wait for materialisation to record the admission delay
    let deadline = std::time::Instant::now() + SPEC_WAIT;
    let event = loop {
        let events = plane.api.timeline(&response.id).await.unwrap();
        if let Some(event) = events.iter().find(|e| e.event_type == "queue.backpressure") {
            break event.clone();
        }
        assert!(std::time::Instant::now() < deadline, "no queue.backpressure event");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    };

    let age_ms = event.payload["ageMs"].as_u64().unwrap();
    let delay_ms = event.payload["delayMs"].as_u64().unwrap();
    assert!(age_ms > 100, "age {age_ms}ms must exceed the threshold");
    assert_eq!(delay_ms, ((age_ms - 100) / 2).min(15_000), "delay follows the formula");
    assert!(delay_ms >= 100, "expected a material delay, got {delay_ms}ms");
}

/// The documented reference point: 8s of age against the default 5s
/// threshold delays admission by 1.5s.
#[test]
fn reference_delay_values() {
    assert_eq!(fm_engine::backpressure_delay_ms(8_000, 5_000), 1_500);
    assert_eq!(fm_engine::backpressure_delay_ms(65_000, 5_000), 15_000);
    assert_eq!(fm_engine::backpressure_delay_ms(4_000, 5_000), 0);
}

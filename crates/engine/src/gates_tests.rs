// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::engine::tests::testbed;
use fm_core::test_support::{sample_plan, test_user};
use fm_core::{event_types, Run, StepId};

async fn run_with_awaiting_step(bed: &crate::engine::tests::TestBed) -> (Run, StepId) {
    let run = bed.engine.store().create_run(sample_plan(), "proj-a", test_user()).await.unwrap();
    bed.engine.materialise_steps(&run).await.unwrap();
    let step = bed.engine.store().list_steps_by_run(&run.id).await.unwrap().remove(0);
    bed.engine.store().lease_step(&step.id, StepStatus::Queued, StepStatus::Running).await.unwrap();
    bed.engine
        .store()
        .lease_step(&step.id, StepStatus::Running, StepStatus::AwaitingGate)
        .await
        .unwrap();
    bed.engine
        .store()
        .update_run_status(&run.id, RunStatus::Running, None, None)
        .await
        .unwrap();
    (run, step.id)
}

#[tokio::test]
async fn create_gate_blocks_the_run_and_records_once() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;

    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();
    assert_eq!(gate.status, GateStatus::Pending);

    let current = bed.engine.store().get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(current.status, RunStatus::Blocked);

    // Creating the same gate again returns the row without a second event
    let again = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();
    assert_eq!(again.id, gate.id);

    let events = bed.engine.timeline().replay(&run.id, None).await.unwrap();
    let created = events.iter().filter(|e| e.event_type == event_types::GATE_CREATED).count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn approve_releases_step_and_run() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;
    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();

    let resolved = bed
        .engine
        .resolve_gate(&gate.id, GateResolution::Approve, Some("op"), Some("ship it"))
        .await
        .unwrap();
    assert_eq!(resolved.status, GateStatus::Approved);
    assert_eq!(resolved.approved_by.as_deref(), Some("op"));

    let step = bed.engine.store().get_step(&step_id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Queued);

    let current = bed.engine.store().get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(current.status, RunStatus::Running);

    let events = bed.engine.timeline().replay(&run.id, None).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == event_types::GATE_APPROVED));
}

#[tokio::test]
async fn approving_twice_is_a_noop_success() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;
    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();

    bed.engine.resolve_gate(&gate.id, GateResolution::Approve, Some("op"), None).await.unwrap();
    let second = bed
        .engine
        .resolve_gate(&gate.id, GateResolution::Approve, Some("someone-else"), None)
        .await
        .unwrap();
    // First resolution wins and is returned unchanged
    assert_eq!(second.status, GateStatus::Approved);
    assert_eq!(second.approved_by.as_deref(), Some("op"));

    let events = bed.engine.timeline().replay(&run.id, None).await.unwrap();
    let approvals = events.iter().filter(|e| e.event_type == event_types::GATE_APPROVED).count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn rejecting_a_resolved_gate_does_not_flip_it() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;
    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();

    bed.engine.resolve_gate(&gate.id, GateResolution::Approve, Some("op"), None).await.unwrap();
    let after = bed
        .engine
        .resolve_gate(&gate.id, GateResolution::Reject, Some("op2"), Some("no"))
        .await
        .unwrap();
    assert_eq!(after.status, GateStatus::Approved);
    let _ = run;
}

#[tokio::test]
async fn waive_unblocks_like_approve() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;
    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "typecheck").await.unwrap();

    let resolved =
        bed.engine.resolve_gate(&gate.id, GateResolution::Waive, None, Some("flaky check")).await.unwrap();
    assert_eq!(resolved.status, GateStatus::Waived);

    let step = bed.engine.store().get_step(&step_id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Queued);

    let events = bed.engine.timeline().replay(&run.id, None).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == event_types::GATE_WAIVED));
}

#[tokio::test]
async fn reject_fails_the_step_and_the_run() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;
    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();

    let resolved = bed
        .engine
        .resolve_gate(&gate.id, GateResolution::Reject, Some("op"), Some("not safe"))
        .await
        .unwrap();
    assert_eq!(resolved.status, GateStatus::Rejected);

    let step = bed.engine.store().get_step(&step_id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_ref().unwrap().kind, fm_core::StepErrorKind::Permanent);

    let current = bed.engine.store().get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(current.status, RunStatus::Failed);

    let events = bed.engine.timeline().replay(&run.id, None).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == event_types::GATE_REJECTED));
    assert!(events.iter().any(|e| e.event_type == event_types::STEP_FAILED));
}

#[tokio::test]
async fn reason_is_truncated_to_500_chars() {
    let bed = testbed();
    let (run, step_id) = run_with_awaiting_step(&bed).await;
    let gate = bed.engine.create_gate(&run.id, Some(&step_id), "manual-approval").await.unwrap();

    let long = "y".repeat(900);
    let resolved = bed
        .engine
        .resolve_gate(&gate.id, GateResolution::Approve, Some("op"), Some(&long))
        .await
        .unwrap();
    assert_eq!(resolved.reason.as_ref().unwrap().chars().count(), 500);
}

#[tokio::test]
async fn run_level_gate_rejection_fails_the_run() {
    let bed = testbed();
    let run = bed.engine.store().create_run(sample_plan(), "proj-a", test_user()).await.unwrap();
    let gate = bed.engine.create_gate(&run.id, None, "manual-approval").await.unwrap();
    assert!(gate.step_id.is_none());

    bed.engine.resolve_gate(&gate.id, GateResolution::Reject, Some("op"), None).await.unwrap();
    let current = bed.engine.store().get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(current.status, RunStatus::Failed);
}

#[tokio::test]
async fn unknown_gate_is_not_found() {
    let bed = testbed();
    let err = bed
        .engine
        .resolve_gate(
            &fm_core::GateId::from_string("gat-missing"),
            GateResolution::Approve,
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GateNotFound(_)));
}

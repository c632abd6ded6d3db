// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use serde_json::json;

fn record(seq: u64) -> EventRecord {
    EventRecord {
        run_id: RunId::from_string("run-a"),
        seq,
        event_type: event_types::STEP_STARTED.into(),
        occurred_at: Utc::now(),
        step_id: Some(StepId::from_string("stp-b")),
        payload: json!({"name": "write readme"}),
    }
}

#[test]
fn log_summary_includes_ids_and_seq() {
    let ev = record(3);
    assert_eq!(ev.log_summary(), "step.started run=run-a step=stp-b seq=3");
}

#[test]
fn log_summary_without_step() {
    let mut ev = record(1);
    ev.step_id = None;
    ev.event_type = event_types::RUN_CREATED.into();
    assert_eq!(ev.log_summary(), "run.created run=run-a seq=1");
}

#[test]
fn serde_roundtrip_keeps_payload() {
    let ev = record(7);
    let json = serde_json::to_string(&ev).unwrap();
    let back: EventRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ev);
}

#[test]
fn deserialization_tolerates_unknown_fields() {
    let raw = json!({
        "run_id": "run-a",
        "seq": 1,
        "event_type": "run.created",
        "occurred_at": Utc::now(),
        "payload": {},
        "some_future_field": true
    });
    let ev: EventRecord = serde_json::from_value(raw).unwrap();
    assert_eq!(ev.seq, 1);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::policy::POLICY_KEY;
use serde_json::json;

#[test]
fn effective_inputs_default_to_empty_object() {
    let step = PlanStep::new("s", "codegen");
    assert_eq!(step.effective_inputs(), json!({}));
}

#[test]
fn effective_inputs_embed_policy() {
    let step = PlanStep::new("deny me", "codegen")
        .inputs(json!({"topic": "x"}))
        .tools_allowed(vec!["git_pr".to_string()]);
    let inputs = step.effective_inputs();
    assert_eq!(inputs["topic"], "x");
    assert_eq!(inputs[POLICY_KEY]["tools_allowed"], json!(["git_pr"]));
}

#[test]
fn effective_inputs_without_policy_have_no_policy_key() {
    let step = PlanStep::new("s", "codegen").inputs(json!({"a": 1}));
    assert!(step.effective_inputs().get(POLICY_KEY).is_none());
}

#[test]
fn duplicate_step_name_detection() {
    let plan = Plan {
        goal: "g".into(),
        steps: vec![PlanStep::new("a", "codegen"), PlanStep::new("a", "codegen")],
    };
    assert_eq!(plan.duplicate_step_name(), Some("a"));

    let ok = Plan {
        goal: "g".into(),
        steps: vec![PlanStep::new("a", "codegen"), PlanStep::new("b", "codegen")],
    };
    assert_eq!(ok.duplicate_step_name(), None);
}

#[test]
fn plan_deserializes_from_client_shape() {
    let plan: Plan = serde_json::from_value(json!({
        "goal": "write",
        "steps": [{"name": "write readme", "tool": "codegen",
                   "inputs": {"topic": "Testing", "filename": "haiku.md"}}]
    }))
    .unwrap();
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].tool, "codegen");
}

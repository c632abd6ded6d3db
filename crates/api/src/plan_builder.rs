// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan builder: prompt + options → plan.
//!
//! The builder is a pluggable collaborator; the contract the engine
//! relies on is only that step names are unique within a plan, tool
//! names are registered, and inputs are JSON objects.

use serde_json::json;

use fm_core::{Plan, PlanStep};

use crate::dto::StandardRequest;

pub trait PlanBuilder: Send + Sync {
    fn build(&self, request: &StandardRequest) -> Plan;
}

/// The built-in heuristic: a generation step, optional quality gates,
/// optional up-front manual approval.
#[derive(Default)]
pub struct StandardPlanBuilder;

impl PlanBuilder for StandardPlanBuilder {
    fn build(&self, request: &StandardRequest) -> Plan {
        let filename = request.filename.clone().unwrap_or_else(|| "output.md".to_string());
        let mut steps = Vec::new();

        if request.approval {
            steps.push(PlanStep::new("approval", "manual:deploy"));
        }
        steps.push(
            PlanStep::new("generate content", "codegen")
                .inputs(json!({ "topic": request.prompt, "filename": filename })),
        );
        if request.quality {
            steps.push(PlanStep::new("typecheck", "gate:typecheck"));
            steps.push(PlanStep::new("lint", "gate:lint"));
        }

        Plan { goal: request.prompt.clone(), steps }
    }
}

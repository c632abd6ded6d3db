// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canned fixtures for other crates' tests.

use serde_json::json;

use crate::plan::{Plan, PlanStep};
use crate::run::{UserContext, UserTier};

/// Single-step codegen plan matching the happy-path scenario.
pub fn sample_plan() -> Plan {
    Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("write readme", "codegen")
            .inputs(json!({"topic": "Testing", "filename": "haiku.md"}))],
    }
}

/// Plan whose first step is a manual approval gate.
pub fn gated_plan() -> Plan {
    Plan {
        goal: "deploy".into(),
        steps: vec![
            PlanStep::new("approval", "manual:deploy"),
            PlanStep::new("write readme", "codegen")
                .inputs(json!({"topic": "Testing", "filename": "haiku.md"})),
        ],
    }
}

/// Plan with a step whose policy forbids its own tool.
pub fn denied_plan() -> Plan {
    Plan {
        goal: "write".into(),
        steps: vec![PlanStep::new("deny me", "codegen")
            .tools_allowed(vec!["git_pr".to_string()])],
    }
}

pub fn test_user() -> UserContext {
    UserContext::new("user-test", UserTier::Pro)
}

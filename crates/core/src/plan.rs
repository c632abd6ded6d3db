// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan model: an ordered list of steps, each binding a tool to inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::policy::StepPolicy;

/// A submitted plan. Immutable once a run is created from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// One entry in a plan. Step names must be unique within the plan;
/// the tool name must be registered in the worker's handler registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub tool: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_scope: Option<String>,
}

impl PlanStep {
    pub fn new(name: impl Into<String>, tool: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            inputs: None,
            tools_allowed: None,
            env_allowed: None,
            secrets_scope: None,
        }
    }

    crate::setters! {
        option {
            inputs: Value,
            tools_allowed: Vec<String>,
            env_allowed: Vec<String>,
            secrets_scope: String,
        }
    }

    /// Effective inputs for step materialisation: the declared inputs (or an
    /// empty object), with any plan-level policy fields embedded under
    /// `_policy`.
    pub fn effective_inputs(&self) -> Value {
        let mut inputs = self.inputs.clone().unwrap_or_else(|| Value::Object(Default::default()));
        let policy = StepPolicy {
            tools_allowed: self.tools_allowed.clone(),
            env_allowed: self.env_allowed.clone(),
            secrets_scope: self.secrets_scope.clone(),
        };
        policy.embed(&mut inputs);
        inputs
    }
}

impl Plan {
    /// Validate the collaborator contract: step names unique within the plan
    /// and JSON-canonicalisable inputs (always true for `Value`).
    pub fn duplicate_step_name(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.steps.iter().find(|s| !seen.insert(s.name.as_str())).map(|s| s.name.as_str())
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;

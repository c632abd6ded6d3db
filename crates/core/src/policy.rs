// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step security policy carried inside step inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the policy is embedded in a step's inputs object.
pub const POLICY_KEY: &str = "_policy";

/// Execution constraints for a single step.
///
/// `tools_allowed` is enforced by the runner before dispatch; the other two
/// are passed through to the tool handler as execution constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_scope: Option<String>,
}

impl StepPolicy {
    pub fn is_empty(&self) -> bool {
        self.tools_allowed.is_none() && self.env_allowed.is_none() && self.secrets_scope.is_none()
    }

    /// True when the policy permits running `tool`. An absent allow-list
    /// permits everything.
    pub fn allows_tool(&self, tool: &str) -> bool {
        match &self.tools_allowed {
            Some(allowed) => allowed.iter().any(|t| t == tool),
            None => true,
        }
    }

    /// Read the policy embedded in a step's inputs, if any.
    ///
    /// Unknown fields inside `_policy` are ignored; a malformed `_policy`
    /// value reads as no policy.
    pub fn from_inputs(inputs: &Value) -> Option<StepPolicy> {
        let raw = inputs.get(POLICY_KEY)?;
        serde_json::from_value(raw.clone()).ok()
    }

    /// Embed the policy into `inputs` under [`POLICY_KEY`].
    /// Non-object inputs are left untouched.
    pub fn embed(&self, inputs: &mut Value) {
        if self.is_empty() {
            return;
        }
        if let Value::Object(map) = inputs {
            if let Ok(raw) = serde_json::to_value(self) {
                map.insert(POLICY_KEY.to_string(), raw);
            }
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;

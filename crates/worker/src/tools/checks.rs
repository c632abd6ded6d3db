// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Check gates: evaluate a result carried in the step inputs and record
//! the gate with the outcome.

use async_trait::async_trait;

use crate::registry::{ToolContext, ToolError, ToolHandler, ToolOutcome};

fn bool_input(ctx: &ToolContext, field: &str) -> bool {
    ctx.inputs.get(field).and_then(|v| v.as_bool()).unwrap_or(true)
}

fn reason_input(ctx: &ToolContext) -> Option<String> {
    ctx.inputs.get("reason").and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// `gate:typecheck` — passes unless `inputs.ok` is false.
pub struct TypecheckGateTool;

#[async_trait]
impl ToolHandler for TypecheckGateTool {
    fn name(&self) -> &str {
        "gate:typecheck"
    }

    async fn invoke(&self, ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::Gate {
            gate_type: "typecheck".into(),
            passed: bool_input(&ctx, "ok"),
            reason: reason_input(&ctx),
        })
    }
}

/// `gate:lint` — passes unless `inputs.ok` is false.
pub struct LintGateTool;

#[async_trait]
impl ToolHandler for LintGateTool {
    fn name(&self) -> &str {
        "gate:lint"
    }

    async fn invoke(&self, ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::Gate {
            gate_type: "lint".into(),
            passed: bool_input(&ctx, "ok"),
            reason: reason_input(&ctx),
        })
    }
}

/// `gate:unit` — compares `inputs.coverage` against the configured floor.
pub struct UnitGateTool {
    threshold: f64,
}

impl UnitGateTool {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: threshold.clamp(0.0, 1.0) }
    }

    pub fn from_env() -> Self {
        Self::new(fm_core::env::coverage_threshold())
    }
}

#[async_trait]
impl ToolHandler for UnitGateTool {
    fn name(&self) -> &str {
        "gate:unit"
    }

    async fn invoke(&self, ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        let coverage = ctx
            .inputs
            .get("coverage")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ToolError::Validation("inputs.coverage is required".to_string()))?;
        let passed = coverage >= self.threshold;
        let reason = if passed {
            None
        } else {
            Some(format!("coverage {coverage:.2} below threshold {:.2}", self.threshold))
        };
        Ok(ToolOutcome::Gate { gate_type: "unit".into(), passed, reason })
    }
}

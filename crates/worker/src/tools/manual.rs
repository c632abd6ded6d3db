// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual approval steps.

use async_trait::async_trait;

use crate::registry::{ToolContext, ToolError, ToolHandler, ToolOutcome};

/// Converts its step into a pending `manual-approval` gate. The runner
/// parks the step; once an operator approves or waives, redelivery
/// settles it.
pub struct ManualDeployTool;

#[async_trait]
impl ToolHandler for ManualDeployTool {
    fn name(&self) -> &str {
        "manual:deploy"
    }

    async fn invoke(&self, _ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::AwaitGate { gate_type: "manual-approval".into() })
    }
}

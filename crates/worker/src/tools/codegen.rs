// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Code/document generation through the LLM router.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use fm_llm::{CompletionOpts, Router, RouterError, TaskKind};

use crate::registry::{ToolArtifact, ToolContext, ToolError, ToolHandler, ToolOutcome};
use crate::tools::mime_for;

/// Generates one file artifact from `{topic, filename}` inputs.
pub struct CodegenTool {
    router: Arc<Router>,
}

impl CodegenTool {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl ToolHandler for CodegenTool {
    fn name(&self) -> &str {
        "codegen"
    }

    async fn invoke(&self, ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        let topic = ctx
            .inputs
            .get("topic")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("inputs.topic is required".to_string()))?;
        let filename = ctx
            .inputs
            .get("filename")
            .and_then(|v| v.as_str())
            .unwrap_or("output.md")
            .to_string();

        let prompt = format!("Write the contents of `{filename}` about: {topic}");
        let opts = CompletionOpts {
            model: ctx.inputs.get("model").and_then(|v| v.as_str()).map(|s| s.to_string()),
            ..Default::default()
        };

        let (text, provider, model) = match self.router.route(TaskKind::Codegen, &prompt, &opts).await
        {
            Ok(completion) => (completion.text, completion.provider, completion.model),
            // No provider configured: fall back to a deterministic body so
            // offline single-process setups still produce output.
            Err(RouterError::NoCandidates(_)) => {
                tracing::debug!(filename = %filename, "no llm provider active, using stub body");
                (format!("# {topic}\n\n(generated offline)\n"), "none".to_string(), "stub".to_string())
            }
            Err(err @ RouterError::Exhausted { .. }) => {
                return Err(ToolError::Transient(err.to_string()));
            }
        };

        Ok(ToolOutcome::Success {
            summary: json!({ "filename": filename, "provider": provider, "model": model }),
            artifacts: vec![ToolArtifact {
                mime: mime_for(&filename).to_string(),
                name: filename,
                bytes: text.into_bytes(),
            }],
        })
    }
}

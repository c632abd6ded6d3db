// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace writes, persisted as artifacts.

use async_trait::async_trait;
use serde_json::json;

use crate::registry::{ToolArtifact, ToolContext, ToolError, ToolHandler, ToolOutcome};
use crate::tools::mime_for;

/// Writes `inputs.files[{path, content}]` as step artifacts. The concrete
/// workspace backend is a separate collaborator; the artifact records are
/// the observable effect here.
pub struct WorkspaceWriteTool;

#[async_trait]
impl ToolHandler for WorkspaceWriteTool {
    fn name(&self) -> &str {
        "workspace:write"
    }

    async fn invoke(&self, ctx: ToolContext) -> Result<ToolOutcome, ToolError> {
        let files = ctx
            .inputs
            .get("files")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::Validation("inputs.files must be an array".to_string()))?;

        let mut artifacts = Vec::with_capacity(files.len());
        for file in files {
            let path = file
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::Validation("files[].path is required".to_string()))?;
            let content = file.get("content").and_then(|v| v.as_str()).unwrap_or_default();
            artifacts.push(ToolArtifact {
                name: path.to_string(),
                mime: mime_for(path).to_string(),
                bytes: content.as_bytes().to_vec(),
            });
        }

        Ok(ToolOutcome::Success {
            summary: json!({ "files_written": artifacts.len() }),
            artifacts,
        })
    }
}

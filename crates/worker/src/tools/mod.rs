// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in tool handlers.

mod checks;
mod codegen;
mod manual;
mod workspace;

use std::sync::Arc;

use fm_llm::Router;

use crate::registry::ToolRegistry;

pub use checks::{LintGateTool, TypecheckGateTool, UnitGateTool};
pub use codegen::CodegenTool;
pub use manual::ManualDeployTool;
pub use workspace::WorkspaceWriteTool;

/// Registry with every built-in handler wired.
pub fn builtin_registry(router: Arc<Router>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CodegenTool::new(router)));
    registry.register(Arc::new(ManualDeployTool));
    registry.register(Arc::new(TypecheckGateTool));
    registry.register(Arc::new(LintGateTool));
    registry.register(Arc::new(UnitGateTool::from_env()));
    registry.register(Arc::new(WorkspaceWriteTool));
    registry
}

/// MIME type from a filename extension.
pub(crate) fn mime_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("html") => "text/html",
        Some("rs") | Some("py") | Some("ts") | Some("js") => "text/x-source",
        _ => "text/plain",
    }
}

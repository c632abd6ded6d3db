// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool handler trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use fm_core::{RunId, StepId, StepPolicy};

/// Execution context handed to a tool handler.
#[derive(Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    pub step_id: StepId,
    pub inputs: Value,
    /// `env_allowed` / `secrets_scope` constraints from the step policy.
    pub policy: StepPolicy,
    /// Trips when the run is cancelled; handlers should bail out at their
    /// next suspension point.
    pub cancel: CancellationToken,
    pub attempt: u32,
}

/// A file-like output produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolArtifact {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// What a handler produced.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// Normal completion; artifacts are persisted by the runner.
    Success { summary: Value, artifacts: Vec<ToolArtifact> },
    /// The step must park on an operator gate (e.g. manual deploys).
    AwaitGate { gate_type: SmolStr },
    /// A check tool evaluated its gate: the runner records the gate with
    /// this outcome and settles the step accordingly.
    Gate { gate_type: SmolStr, passed: bool, reason: Option<String> },
}

/// Handler failure, classified at the point of origin.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Bad inputs; never retried.
    #[error("validation: {0}")]
    Validation(String),

    /// Worth another delivery within the queue's attempt budget.
    #[error("transient: {0}")]
    Transient(String),

    /// Deterministic failure; never retried.
    #[error("{0}")]
    Fatal(String),
}

/// A named tool. Implementations must be safe to invoke concurrently.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, ctx: ToolContext) -> Result<ToolOutcome, ToolError>;
}

/// Name-keyed handler registry.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<SmolStr, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<SmolStr> {
        let mut names: Vec<SmolStr> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

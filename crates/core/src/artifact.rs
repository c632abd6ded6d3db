// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact records: immutable outputs produced by steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ArtifactId, RunId, StepId};

/// Driver-reported storage metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A persisted step output. Immutable once written; replacement
/// requires a new artifact id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub step_id: StepId,
    /// Logical name, stable per step (e.g. the output filename).
    pub name: String,
    pub mime: String,
    /// Logical path; the storage driver maps it to a concrete backend.
    pub path: String,
    #[serde(default)]
    pub meta: ArtifactMeta,
    pub created_at: DateTime<Utc>,
}

/// Logical artifact path: `runs/{run}/steps/{step}/{name}`.
pub fn artifact_path(run_id: &RunId, step_id: &StepId, name: &str) -> String {
    format!("runs/{run_id}/steps/{step_id}/{name}")
}

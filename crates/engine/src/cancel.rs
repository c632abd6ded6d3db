// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run cancellation tokens shared between the engine and the runner.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use fm_core::RunId;

/// Registry of per-run cancellation tokens. The runner checks the token
/// before starting a step and passes it to handlers; run cancellation
/// trips it.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<RunId, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a run, created on first use.
    pub fn token(&self, run_id: &RunId) -> CancellationToken {
        self.tokens.lock().entry(*run_id).or_default().clone()
    }

    pub fn is_cancelled(&self, run_id: &RunId) -> bool {
        self.tokens.lock().get(run_id).map(|t| t.is_cancelled()).unwrap_or(false)
    }

    /// Trip the run's token.
    pub fn cancel(&self, run_id: &RunId) {
        self.token(run_id).cancel();
    }

    /// Drop the token once the run is terminal.
    pub fn remove(&self, run_id: &RunId) {
        self.tokens.lock().remove(run_id);
    }
}

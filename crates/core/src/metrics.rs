// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counter snapshots shared between the reliability kit, router, and API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Circuit breaker counters, reported per protected dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerCounters {
    pub success: u64,
    pub failure: u64,
    pub rejected: u64,
    pub opened: u64,
    pub closed: u64,
}

/// Process-local health snapshot for status queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// LLM retry totals keyed by provider name.
    #[serde(default)]
    pub retries_total: HashMap<String, u64>,
    /// Breaker counters keyed by dependency name.
    #[serde(default)]
    pub breakers: HashMap<String, BreakerCounters>,
}

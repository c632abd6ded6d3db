// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the control plane.

use std::path::PathBuf;
use std::time::Duration;

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

/// Queue driver selection: "memory" (default) or "external".
pub fn queue_driver() -> String {
    std::env::var("QUEUE_DRIVER").unwrap_or_else(|_| "memory".to_string())
}

/// Oldest-job age beyond which step enqueues are delayed (default 5s).
pub fn backpressure_age_ms() -> u64 {
    parse_var("BACKPRESSURE_AGE_MS").unwrap_or(5_000)
}

/// Disable the single-process inline step executor.
pub fn disable_inline_runner() -> bool {
    matches!(std::env::var("DISABLE_INLINE_RUNNER").as_deref(), Ok("1") | Ok("true"))
}

/// Per-step wall clock (default 30s).
pub fn step_timeout() -> Duration {
    Duration::from_millis(parse_var("STEP_TIMEOUT_MS").unwrap_or(30_000))
}

/// Bounded pool size for concurrent step executors (min 1, default 4).
pub fn worker_concurrency() -> usize {
    parse_var::<usize>("WORKER_CONCURRENCY").unwrap_or(4).max(1)
}

/// Coverage floor used by the unit-check gate tool (default 0.9).
pub fn coverage_threshold() -> f64 {
    parse_var::<f64>("COVERAGE_THRESHOLD").unwrap_or(0.9).clamp(0.0, 1.0)
}

/// TTL for the docs completion cache (default 10 min; 0 disables).
pub fn docs_cache_ttl() -> Duration {
    Duration::from_millis(parse_var("DOCS_CACHE_TTL_MS").unwrap_or(600_000))
}

/// Provider order override, comma separated (e.g. "anthropic,openai").
pub fn llm_order() -> Option<Vec<String>> {
    let raw = std::env::var("LLM_ORDER").ok()?;
    let list: Vec<String> =
        raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

/// Root directory for the filesystem store driver.
/// `FM_DATA_DIR` > `XDG_STATE_HOME/foreman` > `~/.local/state/foreman`.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("FM_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("foreman"));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".local/state/foreman"))
}

/// Connection string for the Postgres store/queue drivers.
pub fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty())
}

/// Whether the OpenAI client may send a temperature parameter.
pub fn openai_allow_temperature() -> bool {
    matches!(std::env::var("OPENAI_ALLOW_TEMPERATURE").as_deref(), Ok("1"))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

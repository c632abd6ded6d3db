// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical JSON hashing for idempotency keys and cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::id::RunId;

/// Hex characters of the content hash kept in an idempotency key.
pub const IDEM_HASH_LEN: usize = 12;

/// Render a value as canonical JSON: object keys sorted recursively,
/// no insignificant whitespace. Arrays keep their order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization cannot fail for a String.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Full sha-256 of a string, lowercase hex.
pub fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Idempotency key for a step: `{run}:{name}:{hash12}` where hash12 is the
/// first 12 hex chars of sha-256 over the canonical inputs.
///
/// Two creations of the same step name with the same inputs in the same run
/// always produce the same key regardless of JSON key order.
pub fn idempotency_key(run_id: &RunId, step_name: &str, inputs: &Value) -> String {
    let digest = hash_hex(&canonical_json(inputs));
    format!("{}:{}:{}", run_id, step_name, &digest[..IDEM_HASH_LEN])
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;

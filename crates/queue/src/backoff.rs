// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nack rescheduling policy shared by both drivers.

use std::time::Duration;

/// Attempt budget before a job is dead-lettered.
pub const MAX_ATTEMPTS: u32 = 5;

const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 30_000;

/// Delay before redelivering a job whose attempt `attempt` (1-based) was
/// nacked: capped exponential, 500ms doubling up to 30s.
pub fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let ms = BASE_DELAY_MS.saturating_mul(1 << exp).min(MAX_DELAY_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        first = { 1, 500 },
        second = { 2, 1_000 },
        third = { 3, 2_000 },
        fifth = { 5, 8_000 },
        capped = { 9, 30_000 },
        deep = { 40, 30_000 },
    )]
    fn delays_double_and_cap(attempt: u32, expected_ms: u64) {
        assert_eq!(retry_delay(attempt), Duration::from_millis(expected_ms));
    }
}

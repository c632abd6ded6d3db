// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    pending = { GateStatus::Pending, false },
    approved = { GateStatus::Approved, true },
    waived = { GateStatus::Waived, true },
    rejected = { GateStatus::Rejected, true },
)]
fn terminal_statuses(status: GateStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn approved_and_waived_unblock() {
    assert!(GateStatus::Approved.unblocks());
    assert!(GateStatus::Waived.unblocks());
    assert!(!GateStatus::Rejected.unblocks());
    assert!(!GateStatus::Pending.unblocks());
}

#[test]
fn reason_is_truncated_at_500_chars() {
    let long = "x".repeat(800);
    let truncated = truncate_reason(&long);
    assert_eq!(truncated.chars().count(), GATE_REASON_MAX);
}

#[test]
fn short_reason_is_kept() {
    assert_eq!(truncate_reason("looks good"), "looks good");
}

#[test]
fn truncation_counts_characters_not_bytes() {
    let long: String = "é".repeat(600);
    assert_eq!(truncate_reason(&long).chars().count(), GATE_REASON_MAX);
}

#[test]
fn run_level_gate_has_no_step() {
    let gate = Gate::builder().build();
    assert!(gate.step_id.is_none());
    assert_eq!(gate.status, GateStatus::Pending);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-engine: run and step lifecycle. Plan ingestion, idempotent step
//! materialisation, gate resolution, retry, cancellation, the event
//! timeline bus, and the outbox relay.

mod cancel;
mod engine;
mod error;
mod gates;
mod outbox;
mod timeline;

pub use cancel::CancelRegistry;
pub use engine::{backpressure_delay_ms, finalize_run, EngineConfig, RunEngine, StepExecutor};
pub use error::EngineError;
pub use gates::GateResolution;
pub use outbox::OutboxRelay;
pub use timeline::Timeline;

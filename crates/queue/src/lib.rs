// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-queue: topic-keyed job delivery with delays, capped-exponential
//! retry, and a dead-letter queue. Two drivers share one contract: a
//! single-process cooperative memory queue and a Postgres broker.

mod backoff;
mod memory;
mod pg;
mod queue;

pub use backoff::{retry_delay, MAX_ATTEMPTS};
pub use memory::MemoryQueue;
pub use pg::PgQueue;
pub use queue::{
    topics, Delivery, DlqEntry, EnqueueOpts, HandlerError, JobHandler, Queue, QueueError,
    StepReady,
};

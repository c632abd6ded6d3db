// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-api: the behaviour behind the HTTP surface. Transport wiring
//! (routing, auth middleware, CORS) is a separate collaborator; this
//! crate exposes one method per route plus the runtime wiring that builds
//! the drivers.

mod api;
mod dto;
mod error;
mod plan_builder;
mod runtime;
mod stream;

pub use api::Api;
pub use dto::{
    CreateGateRequest, CreateRunRequest, CreateRunResponse, Pagination, ResolveGateRequest,
    RunDetail, RunsPage, StandardRequest,
};
pub use error::ApiError;
pub use plan_builder::{PlanBuilder, StandardPlanBuilder};
pub use runtime::{Runtime, RuntimeError, RuntimeOptions};
pub use stream::{RunStream, StreamItem};

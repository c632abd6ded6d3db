// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete provider clients.

mod anthropic;
mod compat;
mod gemini;
mod openai;

#[cfg(any(test, feature = "test-support"))]
mod canned;

pub use anthropic::AnthropicProvider;
pub use compat::{HttpProvider, OpenAiCompatProvider};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

#[cfg(any(test, feature = "test-support"))]
pub use canned::{ScriptedProvider, StaticProvider};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider trait, descriptors, and the registry the router selects from.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use fm_resilience::{Classify, RetryClass};

/// Kind of model work a tool handler is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Codegen,
    Reasoning,
    Docs,
}

fm_core::simple_display! {
    TaskKind {
        Codegen => "codegen",
        Reasoning => "reasoning",
        Docs => "docs",
    }
}

/// Per-call options; everything is optional and provider-interpreted.
#[derive(Debug, Clone, Default)]
pub struct CompletionOpts {
    /// Explicit model override; otherwise the provider's default model.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

/// Token accounting as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// A successful model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Provider failure surface.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration problem; retrying cannot help.
    #[error("missing api key: {0}")]
    MissingKey(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Classify for ProviderError {
    fn class(&self) -> RetryClass {
        match self {
            ProviderError::Http(_) => RetryClass::Retryable,
            ProviderError::Api { status, .. } => match status {
                408 | 429 => RetryClass::Retryable,
                s if *s >= 500 => RetryClass::Retryable,
                _ => RetryClass::NonRetryable,
            },
            ProviderError::MissingKey(_) | ProviderError::Malformed(_) => RetryClass::NonRetryable,
        }
    }
}

/// One model backend. All providers share this call signature.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError>;
}

/// Registry row describing a provider's availability and models.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Inactive providers (e.g. no key configured) are skipped in
    /// selection order.
    pub active: bool,
    pub default_model: String,
    /// Models this provider serves, for model-order routing.
    pub models: Vec<String>,
}

struct RegistryEntry {
    descriptor: ProviderDescriptor,
    provider: Arc<dyn Provider>,
}

/// Name-keyed provider registry. Iteration order is registration order,
/// which makes default routing deterministic.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: IndexMap<String, RegistryEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ProviderDescriptor, provider: Arc<dyn Provider>) {
        self.entries.insert(descriptor.name.clone(), RegistryEntry { descriptor, provider });
    }

    pub fn descriptor(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.entries.get(name).map(|e| Arc::clone(&e.provider))
    }

    /// Provider owning `model`, for model-order routing.
    pub fn provider_for_model(&self, model: &str) -> Option<&ProviderDescriptor> {
        self.entries
            .values()
            .map(|e| &e.descriptor)
            .find(|d| d.models.iter().any(|m| m == model))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Build the standard registry from the environment: the three
    /// first-party providers plus any `LLM_<NAME>_BASE_URL` endpoints.
    /// An endpoint speaks the OpenAI chat dialect unless
    /// `LLM_<NAME>_KIND=http` selects the bare `{prompt, model}` variant.
    pub fn from_env() -> Self {
        use crate::providers::{
            AnthropicProvider, GeminiProvider, HttpProvider, OpenAiCompatProvider, OpenAiProvider,
        };

        let mut registry = Self::new();

        let openai_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        registry.register(
            ProviderDescriptor {
                name: "openai".to_string(),
                active: openai_key.is_some(),
                default_model: "gpt-4o-mini".to_string(),
                models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            },
            Arc::new(OpenAiProvider::new(openai_key.unwrap_or_default())),
        );

        let anthropic_key = std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty());
        registry.register(
            ProviderDescriptor {
                name: "anthropic".to_string(),
                active: anthropic_key.is_some(),
                default_model: "claude-sonnet-4-0".to_string(),
                models: vec!["claude-sonnet-4-0".to_string(), "claude-haiku-4-0".to_string()],
            },
            Arc::new(AnthropicProvider::new(anthropic_key.unwrap_or_default())),
        );

        let gemini_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        registry.register(
            ProviderDescriptor {
                name: "gemini".to_string(),
                active: gemini_key.is_some(),
                default_model: "gemini-2.0-flash".to_string(),
                models: vec!["gemini-2.0-flash".to_string()],
            },
            Arc::new(GeminiProvider::new(gemini_key.unwrap_or_default())),
        );

        // Extra endpoints declared as LLM_<NAME>_BASE_URL with the key in
        // LLM_<NAME>_API_KEY and an optional LLM_<NAME>_KIND.
        for (var, base_url) in std::env::vars() {
            let Some(middle) = var.strip_prefix("LLM_").and_then(|v| v.strip_suffix("_BASE_URL"))
            else {
                continue;
            };
            if middle.is_empty() || base_url.is_empty() {
                continue;
            }
            let name = middle.to_ascii_lowercase();
            let key = std::env::var(format!("LLM_{middle}_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty());
            let kind = std::env::var(format!("LLM_{middle}_KIND")).unwrap_or_default();
            let provider: Arc<dyn Provider> = if kind.eq_ignore_ascii_case("http") {
                Arc::new(HttpProvider::new(
                    name.clone(),
                    base_url,
                    key.clone().unwrap_or_default(),
                ))
            } else {
                Arc::new(OpenAiCompatProvider::new(
                    name.clone(),
                    base_url,
                    key.clone().unwrap_or_default(),
                ))
            };
            registry.register(
                ProviderDescriptor {
                    name,
                    active: key.is_some(),
                    default_model: "default".to_string(),
                    models: Vec::new(),
                },
                provider,
            );
        }

        registry
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;

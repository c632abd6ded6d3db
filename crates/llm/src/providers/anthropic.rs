// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Anthropic messages client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::provider::{Completion, CompletionOpts, Provider, ProviderError, Usage};

const BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

/// Client for the Anthropic messages API.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self { client: Client::new(), api_key }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey("ANTHROPIC_API_KEY".to_string()));
        }
        let request = MessagesRequest {
            model,
            max_tokens: opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![Message { role: "user", content: prompt }],
            system: opts.system.as_deref(),
            temperature: opts.temperature,
        };
        let response = self
            .client
            .post(format!("{BASE_URL}/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }

        let body: MessagesResponse = response.json().await?;
        let text = body
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ProviderError::Malformed("no text block in response".to_string()))?;
        Ok(Completion {
            text,
            provider: self.name().to_string(),
            model: model.to_string(),
            usage: body.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }
}

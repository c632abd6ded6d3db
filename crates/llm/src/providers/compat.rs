// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Openai-compatible and bare-HTTP provider variants.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::provider::{Completion, CompletionOpts, Provider, ProviderError, Usage};

/// Any endpoint speaking the OpenAI chat-completions dialect
/// (vLLM, llama.cpp, gateways). Configured via `LLM_<NAME>_BASE_URL` /
/// `LLM_<NAME>_API_KEY`.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: String, base_url: String, api_key: String) -> Self {
        Self { name, base_url: base_url.trim_end_matches('/').to_string(), api_key, client: Client::new() }
    }
}

#[derive(Debug, Deserialize)]
struct CompatResponse {
    choices: Vec<CompatChoice>,
}

#[derive(Debug, Deserialize)]
struct CompatChoice {
    message: CompatMessage,
}

#[derive(Debug, Deserialize)]
struct CompatMessage {
    content: String,
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey(format!(
                "LLM_{}_API_KEY",
                self.name.to_ascii_uppercase()
            )));
        }
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": opts.max_tokens,
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }
        let body: CompatResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("no choices in response".to_string()))?;
        Ok(Completion {
            text,
            provider: self.name.clone(),
            model: model.to_string(),
            usage: None,
        })
    }
}

/// Minimal provider posting `{prompt, model}` JSON to a caller-supplied
/// endpoint with bearer auth; expects `{text, usage?}` back. Selected
/// for an endpoint with `LLM_<NAME>_KIND=http`.
pub struct HttpProvider {
    name: String,
    endpoint: String,
    token: String,
    client: Client,
}

impl HttpProvider {
    pub fn new(name: String, endpoint: String, token: String) -> Self {
        Self { name, endpoint, token, client: Client::new() }
    }
}

#[derive(Debug, Serialize)]
struct HttpRequest<'a> {
    prompt: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct HttpResponse {
    text: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        _opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&HttpRequest { prompt, model })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }
        let body: HttpResponse = response.json().await?;
        Ok(Completion {
            text: body.text,
            provider: self.name.clone(),
            model: model.to_string(),
            usage: body.usage,
        })
    }
}

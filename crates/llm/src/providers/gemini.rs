// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Google Gemini generateContent client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::provider::{Completion, CompletionOpts, Provider, ProviderError, Usage};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_tokens: Option<u64>,
    #[serde(rename = "candidatesTokenCount", default)]
    candidate_tokens: Option<u64>,
}

/// Client for the Gemini REST API.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self { client: Client::new(), api_key }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey("GEMINI_API_KEY".to_string()));
        }
        let generation_config = if opts.max_tokens.is_some() || opts.temperature.is_some() {
            Some(GenerationConfig {
                max_output_tokens: opts.max_tokens,
                temperature: opts.temperature,
            })
        } else {
            None
        };
        let request = GenerateRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
            generation_config,
        };
        let response = self
            .client
            .post(format!("{BASE_URL}/models/{model}:generateContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }

        let body: GenerateResponse = response.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| ProviderError::Malformed("no candidate text".to_string()))?;
        Ok(Completion {
            text,
            provider: self.name().to_string(),
            model: model.to_string(),
            usage: body.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.candidate_tokens,
            }),
        })
    }
}

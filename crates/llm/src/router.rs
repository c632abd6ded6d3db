// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered provider selection with retries, breakers, and the docs cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use fm_core::hash_hex;
use fm_core::metrics::MetricsSnapshot;
use fm_resilience::{retry, BreakerConfig, BreakerError, CircuitBreaker, Classify, RetryClass, RetryPolicy};

use crate::cache::DocsCache;
use crate::provider::{Completion, CompletionOpts, ProviderError, ProviderRegistry, TaskKind};

/// Router tuning. Defaults per the control-plane contract: 15s per call,
/// 2 retries with 250ms linear backoff, 10min docs cache.
pub struct RouterConfig {
    /// Provider order per task; falls back to the built-in defaults.
    pub provider_order: HashMap<TaskKind, Vec<String>>,
    /// Model order per task; when present it wins over provider order.
    pub model_order: HashMap<TaskKind, Vec<String>>,
    pub call_timeout: Duration,
    pub retries: u32,
    pub retry_base: Duration,
    pub docs_cache_ttl: Duration,
    /// Tuning for the per-provider circuit breakers.
    pub breaker: BreakerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            provider_order: HashMap::new(),
            model_order: HashMap::new(),
            call_timeout: Duration::from_secs(15),
            retries: 2,
            retry_base: Duration::from_millis(250),
            docs_cache_ttl: Duration::from_millis(600_000),
            breaker: BreakerConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Apply the `LLM_ORDER` / `DOCS_CACHE_TTL_MS` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(order) = fm_core::env::llm_order() {
            for task in [TaskKind::Codegen, TaskKind::Reasoning, TaskKind::Docs] {
                config.provider_order.insert(task, order.clone());
            }
        }
        config.docs_cache_ttl = fm_core::env::docs_cache_ttl();
        config
    }
}

fn default_order(task: TaskKind) -> &'static [&'static str] {
    match task {
        TaskKind::Codegen => &["openai", "anthropic", "gemini"],
        TaskKind::Reasoning => &["anthropic", "openai", "gemini"],
        TaskKind::Docs => &["gemini", "anthropic", "openai"],
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no active provider for task {0}")]
    NoCandidates(TaskKind),

    /// Every candidate failed; carries the last error observed.
    #[error("all providers failed for task {task}: {last_error}")]
    Exhausted { task: TaskKind, last_error: String },
}

/// Error of one candidate attempt, classified for the retry wrapper.
#[derive(Debug, Error)]
enum CandidateError {
    #[error(transparent)]
    Breaker(BreakerError<ProviderError>),
}

impl Classify for CandidateError {
    fn class(&self) -> RetryClass {
        let CandidateError::Breaker(inner) = self;
        match inner {
            // An open breaker is transient from the caller's view
            BreakerError::Open { .. } => RetryClass::Retryable,
            BreakerError::Timeout(_) => RetryClass::Retryable,
            BreakerError::Inner(err) => err.class(),
        }
    }
}

/// Layered model access: registry → breaker → timeout → retry → cache.
pub struct Router {
    registry: ProviderRegistry,
    config: RouterConfig,
    cache: DocsCache,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    /// Shared with retry observers, which outlive individual calls.
    retries_total: Arc<Mutex<HashMap<String, u64>>>,
}

impl Router {
    pub fn new(registry: ProviderRegistry, config: RouterConfig) -> Self {
        let cache = DocsCache::new(config.docs_cache_ttl);
        Self {
            registry,
            config,
            cache,
            breakers: Mutex::new(HashMap::new()),
            retries_total: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ProviderRegistry::from_env(), RouterConfig::from_env())
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Route a completion request to the first candidate that answers.
    pub async fn route(
        &self,
        task: TaskKind,
        prompt: &str,
        opts: &CompletionOpts,
    ) -> Result<Completion, RouterError> {
        let candidates = self.candidates(task, opts);
        if candidates.is_empty() {
            return Err(RouterError::NoCandidates(task));
        }

        let mut last_error = String::new();
        for (provider_name, model) in candidates {
            let cache_key = format!("{}:{}:{}", hash_hex(prompt), task, model);
            if task == TaskKind::Docs {
                if let Some(hit) = self.cache.get(&cache_key) {
                    tracing::debug!(task = %task, model = %model, "docs cache hit");
                    return Ok(hit);
                }
            }

            match self.try_candidate(&provider_name, &model, prompt, opts).await {
                Ok(completion) => {
                    if task == TaskKind::Docs {
                        self.cache.put(cache_key, completion.clone());
                    }
                    return Ok(completion);
                }
                Err(err) => {
                    tracing::warn!(
                        task = %task,
                        provider = %provider_name,
                        model = %model,
                        error = %err,
                        "provider candidate failed"
                    );
                    last_error = err.to_string();
                }
            }
        }
        Err(RouterError::Exhausted { task, last_error })
    }

    /// Ordered `(provider, model)` candidates for a task.
    fn candidates(&self, task: TaskKind, opts: &CompletionOpts) -> Vec<(String, String)> {
        if let Some(models) = self.config.model_order.get(&task) {
            return models
                .iter()
                .filter_map(|model| {
                    let descriptor = self.registry.provider_for_model(model)?;
                    if !descriptor.active {
                        return None;
                    }
                    Some((descriptor.name.clone(), model.clone()))
                })
                .collect();
        }

        let order: Vec<String> = match self.config.provider_order.get(&task) {
            Some(order) => order.clone(),
            None => default_order(task).iter().map(|s| s.to_string()).collect(),
        };
        order
            .iter()
            .filter_map(|name| {
                let descriptor = self.registry.descriptor(name)?;
                if !descriptor.active {
                    return None;
                }
                let model =
                    opts.model.clone().unwrap_or_else(|| descriptor.default_model.clone());
                Some((descriptor.name.clone(), model))
            })
            .collect()
    }

    async fn try_candidate(
        &self,
        provider_name: &str,
        model: &str,
        prompt: &str,
        opts: &CompletionOpts,
    ) -> Result<Completion, CandidateError> {
        let provider = match self.registry.provider(provider_name) {
            Some(provider) => provider,
            None => {
                return Err(CandidateError::Breaker(BreakerError::Inner(
                    ProviderError::Malformed(format!("provider not registered: {provider_name}")),
                )))
            }
        };
        let breaker = self.breaker(provider_name);

        let name = provider_name.to_string();
        let counters = Arc::clone(&self.retries_total);
        let policy = RetryPolicy::<CandidateError>::new(self.config.retries + 1, self.config.retry_base)
            .linear()
            .on_retry(move |_, _| {
                *counters.lock().entry(name.clone()).or_insert(0) += 1;
            });

        retry(&policy, |_| {
            let provider = Arc::clone(&provider);
            let breaker = Arc::clone(&breaker);
            async move {
                breaker
                    .call(provider.complete(prompt, model, opts))
                    .await
                    .map_err(CandidateError::Breaker)
            }
        })
        .await
    }

    fn breaker(&self, provider_name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(breakers.entry(provider_name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                format!("llm:{provider_name}"),
                BreakerConfig { call_timeout: self.config.call_timeout, ..self.config.breaker },
            ))
        }))
    }

    /// Counter snapshot for status reporting.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            retries_total: self.retries_total.lock().clone(),
            breakers: HashMap::new(),
        };
        for (name, breaker) in self.breakers.lock().iter() {
            snapshot.breakers.insert(name.clone(), breaker.counters());
        }
        snapshot
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::provider::ProviderDescriptor;
use crate::providers::{ScriptedProvider, StaticProvider};

fn descriptor(name: &str, active: bool, model: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        active,
        default_model: model.to_string(),
        models: vec![model.to_string()],
    }
}

fn fast_config() -> RouterConfig {
    RouterConfig {
        call_timeout: Duration::from_millis(500),
        retries: 2,
        retry_base: Duration::from_millis(1),
        docs_cache_ttl: Duration::from_secs(60),
        ..Default::default()
    }
}

#[tokio::test]
async fn routes_to_first_active_provider_in_default_order() {
    let mut registry = ProviderRegistry::new();
    // Docs order is gemini, anthropic, openai
    registry.register(descriptor("openai", true, "gpt-4o-mini"), Arc::new(StaticProvider::new("openai", "from openai")));
    registry.register(descriptor("anthropic", true, "claude-sonnet-4-0"), Arc::new(StaticProvider::new("anthropic", "from anthropic")));
    registry.register(descriptor("gemini", true, "gemini-2.0-flash"), Arc::new(StaticProvider::new("gemini", "from gemini")));

    let router = Router::new(registry, fast_config());
    let out = router.route(TaskKind::Docs, "hello", &CompletionOpts::default()).await.unwrap();
    assert_eq!(out.provider, "gemini");
    assert_eq!(out.model, "gemini-2.0-flash");

    let out = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap();
    assert_eq!(out.provider, "openai");
}

#[tokio::test]
async fn skips_inactive_providers() {
    let mut registry = ProviderRegistry::new();
    registry.register(descriptor("openai", false, "gpt-4o-mini"), Arc::new(StaticProvider::new("openai", "x")));
    registry.register(descriptor("anthropic", true, "claude-sonnet-4-0"), Arc::new(StaticProvider::new("anthropic", "from anthropic")));

    let router = Router::new(registry, fast_config());
    let out = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap();
    assert_eq!(out.provider, "anthropic");
}

#[tokio::test]
async fn no_active_provider_is_an_error() {
    let mut registry = ProviderRegistry::new();
    registry.register(descriptor("openai", false, "gpt-4o-mini"), Arc::new(StaticProvider::new("openai", "x")));
    let router = Router::new(registry, fast_config());
    let err = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap_err();
    assert!(matches!(err, RouterError::NoCandidates(TaskKind::Codegen)));
}

#[tokio::test]
async fn model_order_wins_over_provider_order() {
    let mut registry = ProviderRegistry::new();
    registry.register(descriptor("openai", true, "gpt-4o-mini"), Arc::new(StaticProvider::new("openai", "from openai")));
    registry.register(descriptor("anthropic", true, "claude-sonnet-4-0"), Arc::new(StaticProvider::new("anthropic", "from anthropic")));

    let mut config = fast_config();
    config.model_order.insert(TaskKind::Codegen, vec!["claude-sonnet-4-0".to_string()]);
    let router = Router::new(registry, config);
    let out = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap();
    assert_eq!(out.provider, "anthropic");
    assert_eq!(out.model, "claude-sonnet-4-0");
}

#[tokio::test]
async fn retries_then_falls_back_and_counts() {
    let mut registry = ProviderRegistry::new();
    // Fails more times than the per-candidate retry budget (3 attempts)
    let flaky = Arc::new(ScriptedProvider::fail_times("openai", 10, "never"));
    registry.register(descriptor("openai", true, "gpt-4o-mini"), flaky.clone());
    registry.register(descriptor("anthropic", true, "claude-sonnet-4-0"), Arc::new(StaticProvider::new("anthropic", "fallback")));

    let router = Router::new(registry, fast_config());
    let out = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap();
    assert_eq!(out.text, "fallback");
    assert_eq!(flaky.calls(), 3);

    let metrics = router.metrics();
    assert_eq!(metrics.retries_total.get("openai"), Some(&2));
}

#[tokio::test]
async fn transient_failure_recovers_within_retry_budget() {
    let mut registry = ProviderRegistry::new();
    let flaky = Arc::new(ScriptedProvider::fail_times("openai", 2, "recovered"));
    registry.register(descriptor("openai", true, "gpt-4o-mini"), flaky.clone());

    let router = Router::new(registry, fast_config());
    let out = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap();
    assert_eq!(out.text, "recovered");
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn docs_responses_are_cached() {
    let mut registry = ProviderRegistry::new();
    let provider = Arc::new(StaticProvider::new("gemini", "doc body"));
    registry.register(descriptor("gemini", true, "gemini-2.0-flash"), provider.clone());

    let router = Router::new(registry, fast_config());
    let first = router.route(TaskKind::Docs, "explain queues", &CompletionOpts::default()).await.unwrap();
    let second = router.route(TaskKind::Docs, "explain queues", &CompletionOpts::default()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);

    // Different prompt misses the cache
    router.route(TaskKind::Docs, "explain gates", &CompletionOpts::default()).await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn codegen_is_never_cached() {
    let mut registry = ProviderRegistry::new();
    let provider = Arc::new(StaticProvider::new("openai", "code"));
    registry.register(descriptor("openai", true, "gpt-4o-mini"), provider.clone());

    let router = Router::new(registry, fast_config());
    router.route(TaskKind::Codegen, "write it", &CompletionOpts::default()).await.unwrap();
    router.route(TaskKind::Codegen, "write it", &CompletionOpts::default()).await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn surfaces_last_error_when_everything_fails() {
    let mut registry = ProviderRegistry::new();
    registry.register(
        descriptor("openai", true, "gpt-4o-mini"),
        Arc::new(ScriptedProvider::new("openai", vec![Err(500)])),
    );
    let router = Router::new(registry, fast_config());
    let err = router.route(TaskKind::Codegen, "hello", &CompletionOpts::default()).await.unwrap_err();
    match err {
        RouterError::Exhausted { task, last_error } => {
            assert_eq!(task, TaskKind::Codegen);
            assert!(last_error.contains("500"), "unexpected error: {last_error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn breaker_opens_after_consecutive_failures_and_short_circuits() {
    let mut registry = ProviderRegistry::new();
    let failing = Arc::new(ScriptedProvider::new("openai", vec![Err(503)]));
    registry.register(descriptor("openai", true, "gpt-4o-mini"), failing.clone());

    let mut config = fast_config();
    config.retries = 0;
    let router = Router::new(registry, config);

    // Five consecutive failures trip the breaker
    for _ in 0..5 {
        let _ = router.route(TaskKind::Codegen, "x", &CompletionOpts::default()).await;
    }
    assert_eq!(failing.calls(), 5);

    // Sixth call is rejected without reaching the provider
    let err = router.route(TaskKind::Codegen, "x", &CompletionOpts::default()).await.unwrap_err();
    assert!(matches!(err, RouterError::Exhausted { .. }));
    assert_eq!(failing.calls(), 5);

    let metrics = router.metrics();
    let counters = metrics.breakers.get("llm:openai").unwrap();
    assert_eq!(counters.opened, 1);
    assert!(counters.rejected >= 1);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider circuit breaker opens under consecutive failures and
//! recovers after its reset window.

use crate::prelude::*;
use fm_llm::{providers::ScriptedProvider, CompletionOpts, ProviderDescriptor, ProviderRegistry, TaskKind};
use fm_resilience::BreakerConfig;
use std::sync::Arc;
use std::time::Duration;

fn breaker_router(provider: Arc<ScriptedProvider>) -> Router {
    let mut providers = ProviderRegistry::new();
    providers.register(
        ProviderDescriptor {
            name: "openai".to_string(),
            active: true,
            default_model: "gpt-4o-mini".to_string(),
            models: vec!["gpt-4o-mini".to_string()],
        },
        provider,
    );
    Router::new(
        providers,
        RouterConfig {
            retries: 0,
            breaker: BreakerConfig {
                failure_threshold: 5,
                success_threshold: 1,
                call_timeout: Duration::from_millis(500),
                reset_timeout: Duration::from_millis(100),
            },
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn breaker_opens_on_failures_and_closes_after_reset() {
    // Five failures, then healthy forever
    let provider = Arc::new(ScriptedProvider::fail_times("openai", 5, "recovered"));
    let router = breaker_router(Arc::clone(&provider));
    let opts = CompletionOpts::default();

    // Five consecutive failures trip the breaker
    for _ in 0..5 {
        let _ = router.route(TaskKind::Codegen, "x", &opts).await;
    }
    assert_eq!(provider.calls(), 5);

    // Sixth call is rejected without reaching the provider
    let err = router.route(TaskKind::Codegen, "x", &opts).await.unwrap_err();
    assert!(err.to_string().contains("circuit open"), "got: {err}");
    assert_eq!(provider.calls(), 5);

    let counters = router.metrics().breakers.get("llm:openai").copied().unwrap();
    assert_eq!(counters.opened, 1);
    assert_eq!(counters.rejected, 1);

    // After the reset window a success closes the breaker again
    tokio::time::sleep(Duration::from_millis(150)).await;
    let out = router.route(TaskKind::Codegen, "x", &opts).await.unwrap();
    assert_eq!(out.text, "recovered");

    let counters = router.metrics().breakers.get("llm:openai").copied().unwrap();
    assert_eq!(counters.closed, 1);

    // Closed for good: the next call flows straight through
    let out = router.route(TaskKind::Codegen, "x", &opts).await.unwrap();
    assert_eq!(out.text, "recovered");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use yare::parameterized;

#[parameterized(
    malformed_is_fatal = { ProviderError::Malformed("x".into()), RetryClass::NonRetryable },
    missing_key_is_fatal = { ProviderError::MissingKey("OPENAI_API_KEY".into()), RetryClass::NonRetryable },
    rate_limit_retries = { ProviderError::Api { status: 429, message: "slow down".into() }, RetryClass::Retryable },
    server_error_retries = { ProviderError::Api { status: 503, message: "overloaded".into() }, RetryClass::Retryable },
    bad_request_is_fatal = { ProviderError::Api { status: 400, message: "bad prompt".into() }, RetryClass::NonRetryable },
    auth_error_is_fatal = { ProviderError::Api { status: 401, message: "no".into() }, RetryClass::NonRetryable },
)]
fn provider_error_classes(err: ProviderError, expected: RetryClass) {
    assert_eq!(err.class(), expected);
}

#[test]
#[serial]
fn registry_from_env_marks_keyless_providers_inactive() {
    std::env::remove_var("OPENAI_API_KEY");
    std::env::remove_var("ANTHROPIC_API_KEY");
    std::env::set_var("GEMINI_API_KEY", "test-key");

    let registry = ProviderRegistry::from_env();
    assert!(!registry.descriptor("openai").unwrap().active);
    assert!(!registry.descriptor("anthropic").unwrap().active);
    assert!(registry.descriptor("gemini").unwrap().active);

    std::env::remove_var("GEMINI_API_KEY");
}

#[test]
#[serial]
fn registry_picks_up_compatible_endpoints() {
    std::env::set_var("LLM_LOCAL_BASE_URL", "http://localhost:8080/v1");
    std::env::set_var("LLM_LOCAL_API_KEY", "k");

    let registry = ProviderRegistry::from_env();
    let desc = registry.descriptor("local").unwrap();
    assert!(desc.active);

    std::env::remove_var("LLM_LOCAL_BASE_URL");
    std::env::remove_var("LLM_LOCAL_API_KEY");
}

#[test]
#[serial]
fn registry_selects_the_bare_http_variant_by_kind() {
    std::env::set_var("LLM_HOOK_BASE_URL", "http://localhost:9999/complete");
    std::env::set_var("LLM_HOOK_API_KEY", "k");
    std::env::set_var("LLM_HOOK_KIND", "http");

    let registry = ProviderRegistry::from_env();
    let desc = registry.descriptor("hook").unwrap();
    assert!(desc.active);
    assert_eq!(registry.provider("hook").unwrap().name(), "hook");

    // A keyless http endpoint registers inactive like any other provider
    std::env::remove_var("LLM_HOOK_API_KEY");
    let registry = ProviderRegistry::from_env();
    assert!(!registry.descriptor("hook").unwrap().active);

    std::env::remove_var("LLM_HOOK_BASE_URL");
    std::env::remove_var("LLM_HOOK_KIND");
}

#[test]
fn provider_for_model_finds_owner() {
    let mut registry = ProviderRegistry::new();
    registry.register(
        ProviderDescriptor {
            name: "anthropic".to_string(),
            active: true,
            default_model: "claude-sonnet-4-0".to_string(),
            models: vec!["claude-sonnet-4-0".to_string()],
        },
        std::sync::Arc::new(crate::providers::AnthropicProvider::new("k".to_string())),
    );
    assert_eq!(registry.provider_for_model("claude-sonnet-4-0").unwrap().name, "anthropic");
    assert!(registry.provider_for_model("unknown-model").is_none());
}

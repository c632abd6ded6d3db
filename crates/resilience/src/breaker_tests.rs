// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn fast_config() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 5,
        success_threshold: 2,
        call_timeout: Duration::from_millis(100),
        reset_timeout: Duration::from_millis(50),
    }
}

async fn fail(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
    breaker.call::<u32, _, _>(async { Err("boom") }).await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
    breaker.call::<u32, &'static str, _>(async { Ok(1) }).await
}

#[tokio::test]
async fn opens_after_consecutive_failures() {
    let breaker = CircuitBreaker::new("llm", fast_config());
    for _ in 0..5 {
        let _ = fail(&breaker).await;
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    // Sixth call rejected without reaching the dependency
    let err = fail(&breaker).await.unwrap_err();
    assert!(matches!(err, BreakerError::Open { .. }));
    assert_eq!(breaker.counters().rejected, 1);
    assert_eq!(breaker.counters().opened, 1);
}

#[tokio::test]
async fn success_resets_failure_streak() {
    let breaker = CircuitBreaker::new("llm", fast_config());
    for _ in 0..4 {
        let _ = fail(&breaker).await;
    }
    let _ = succeed(&breaker).await;
    for _ in 0..4 {
        let _ = fail(&breaker).await;
    }
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[tokio::test]
async fn recovers_through_half_open() {
    let breaker = CircuitBreaker::new("llm", fast_config());
    for _ in 0..5 {
        let _ = fail(&breaker).await;
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(60)).await;

    // First probe admits and succeeds; one more success closes
    assert!(succeed(&breaker).await.is_ok());
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    assert!(succeed(&breaker).await.is_ok());
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_eq!(breaker.counters().closed, 1);
}

#[tokio::test]
async fn half_open_failure_reopens() {
    let breaker = CircuitBreaker::new("llm", fast_config());
    for _ in 0..5 {
        let _ = fail(&breaker).await;
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    let _ = fail(&breaker).await;
    assert_eq!(breaker.state(), BreakerState::Open);
    assert_eq!(breaker.counters().opened, 2);

    // Back to rejecting until the next reset window
    let err = fail(&breaker).await.unwrap_err();
    assert!(matches!(err, BreakerError::Open { .. }));
}

#[tokio::test]
async fn slow_calls_count_as_failures() {
    let breaker = CircuitBreaker::new("llm", fast_config());
    let result = breaker
        .call::<u32, &'static str, _>(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
    assert!(matches!(result.unwrap_err(), BreakerError::Timeout(_)));
    assert_eq!(breaker.counters().failure, 1);
}

#[tokio::test]
async fn counters_track_successes() {
    let breaker = CircuitBreaker::new("llm", fast_config());
    let _ = succeed(&breaker).await;
    let _ = succeed(&breaker).await;
    assert_eq!(breaker.counters().success, 2);
    assert_eq!(breaker.counters().failure, 0);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::test]
async fn acquire_and_release() {
    let mutex = TimedMutex::new();
    {
        let _guard = mutex.acquire().await;
    }
    // Released — can be taken again
    let _guard = mutex.acquire().await;
}

#[tokio::test]
async fn acquire_timeout_rejects_when_held() {
    let mutex = TimedMutex::new();
    let _guard = mutex.acquire().await;
    let err = mutex.acquire_timeout(Duration::from_millis(10)).await.unwrap_err();
    assert_eq!(err, AcquireTimeout(Duration::from_millis(10)));
}

#[tokio::test]
async fn acquire_timeout_succeeds_when_free() {
    let mutex = TimedMutex::new();
    assert!(mutex.acquire_timeout(Duration::from_millis(10)).await.is_ok());
}

#[tokio::test]
async fn run_exclusive_serialises_sections() {
    let mutex = TimedMutex::new();
    let counter = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let mutex = mutex.clone();
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            mutex
                .run_exclusive(async {
                    let seen = counter.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    // No other task entered while we held the lock
                    assert_eq!(counter.load(Ordering::SeqCst), seen + 1);
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn run_exclusive_releases_on_failure_paths() {
    let mutex = TimedMutex::new();
    let result: Result<(), &str> = mutex.run_exclusive(async { Err("boom") }).await;
    assert!(result.is_err());
    // Lock is free again
    assert!(mutex.acquire_timeout(Duration::from_millis(10)).await.is_ok());
}

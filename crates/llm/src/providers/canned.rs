// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline providers for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::provider::{Completion, CompletionOpts, Provider, ProviderError};

/// Always answers with a fixed body.
pub struct StaticProvider {
    name: String,
    text: String,
    calls: AtomicU64,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into(), calls: AtomicU64::new(0) }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        _prompt: &str,
        model: &str,
        _opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: self.text.clone(),
            provider: self.name.clone(),
            model: model.to_string(),
            usage: None,
        })
    }
}

/// Plays back a scripted sequence of outcomes, then repeats the last one.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<Vec<Result<String, u16>>>,
    calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, script: Vec<Result<String, u16>>) -> Self {
        let mut script = script;
        script.reverse();
        Self { name: name.into(), script: Mutex::new(script), calls: AtomicU64::new(0) }
    }

    /// Fails `n` times with a 503, then succeeds with `text` forever.
    pub fn fail_times(name: impl Into<String>, n: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut script: Vec<Result<String, u16>> = vec![Err(503); n];
        script.push(Ok(text));
        Self::new(name, script)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        _prompt: &str,
        model: &str,
        _opts: &CompletionOpts,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop()
            } else {
                script.last().cloned()
            }
        };
        match next {
            Some(Ok(text)) => Ok(Completion {
                text,
                provider: self.name.clone(),
                model: model.to_string(),
                usage: None,
            }),
            Some(Err(status)) => {
                Err(ProviderError::Api { status, message: "scripted failure".to_string() })
            }
            None => Err(ProviderError::Malformed("empty script".to_string())),
        }
    }
}

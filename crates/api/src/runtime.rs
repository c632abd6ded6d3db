// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring: build the store and queue drivers from the
//! environment, assemble engine + runner, and tear everything down on
//! shutdown. The three process-wide handles (store, queue, breakers
//! inside the router) live here and are initialised explicitly, never
//! from static initialisers.

use std::sync::Arc;

use thiserror::Error;

use fm_engine::{EngineConfig, OutboxRelay, RunEngine};
use fm_llm::Router;
use fm_queue::{MemoryQueue, PgQueue, Queue, QueueError};
use fm_store::{FsStore, PgStore, Store, StoreError};
use fm_worker::{tools::builtin_registry, RunnerConfig, StepRunner};

use crate::api::Api;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// What to start alongside the control plane.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Subscribe the step runner to `step.ready`.
    pub start_worker: bool,
    /// Run the outbox relay loop.
    pub relay_outbox: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { start_worker: true, relay_outbox: true }
    }
}

enum QueueHandle {
    Memory(Arc<MemoryQueue>),
    Pg(Arc<PgQueue>),
}

impl QueueHandle {
    fn as_dyn(&self) -> Arc<dyn Queue> {
        match self {
            QueueHandle::Memory(q) => Arc::clone(q) as Arc<dyn Queue>,
            QueueHandle::Pg(q) => Arc::clone(q) as Arc<dyn Queue>,
        }
    }

    fn shutdown(&self) {
        match self {
            QueueHandle::Memory(q) => q.shutdown(),
            QueueHandle::Pg(q) => q.shutdown(),
        }
    }
}

/// An initialised control-plane process.
pub struct Runtime {
    engine: Arc<RunEngine>,
    runner: Arc<StepRunner>,
    router: Arc<Router>,
    queue: QueueHandle,
    relay: Option<Arc<OutboxRelay>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build drivers from the environment and wire the core together.
    pub async fn init(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let store: Arc<dyn Store> = match fm_core::env::database_url() {
            Some(url) => {
                let store = PgStore::connect(&url).await?;
                store.ensure_schema().await?;
                tracing::info!("store driver: pg");
                Arc::new(store)
            }
            None => {
                let dir = fm_core::env::data_dir()
                    .ok_or_else(|| RuntimeError::Config("no data directory resolvable".into()))?;
                tracing::info!(dir = %dir.display(), "store driver: fs");
                Arc::new(FsStore::open(dir)?)
            }
        };

        let queue = match fm_core::env::queue_driver().as_str() {
            "external" => {
                let url = fm_core::env::database_url().ok_or_else(|| {
                    RuntimeError::Config("QUEUE_DRIVER=external requires DATABASE_URL".into())
                })?;
                let queue = PgQueue::connect(&url).await?;
                queue.ensure_schema().await?;
                tracing::info!("queue driver: external");
                QueueHandle::Pg(Arc::new(queue))
            }
            _ => {
                let concurrency = fm_core::env::worker_concurrency();
                tracing::info!(concurrency, "queue driver: memory");
                QueueHandle::Memory(Arc::new(MemoryQueue::with_concurrency(concurrency)))
            }
        };

        let engine =
            RunEngine::new(Arc::clone(&store), queue.as_dyn(), EngineConfig::from_env());
        let router = Arc::new(Router::from_env());
        let runner = StepRunner::new(
            Arc::clone(&store),
            queue.as_dyn(),
            engine.timeline().clone(),
            Arc::clone(engine.cancels()),
            builtin_registry(Arc::clone(&router)),
            RunnerConfig::from_env(),
        );
        engine.set_executor(Arc::clone(&runner) as Arc<dyn fm_engine::StepExecutor>);

        if options.start_worker {
            StepRunner::subscribe(&runner).await?;
        }

        let relay = if options.relay_outbox {
            let relay = Arc::new(OutboxRelay::new(Arc::clone(&store), queue.as_dyn()));
            Arc::clone(&relay).spawn();
            Some(relay)
        } else {
            None
        };

        Ok(Self { engine, runner, router, queue, relay })
    }

    pub fn api(&self) -> Api {
        Api::new(Arc::clone(&self.engine))
    }

    pub fn engine(&self) -> &Arc<RunEngine> {
        &self.engine
    }

    pub fn runner(&self) -> &Arc<StepRunner> {
        &self.runner
    }

    /// Process-local metrics (router retries, breaker counters).
    pub fn metrics(&self) -> fm_core::metrics::MetricsSnapshot {
        self.router.metrics()
    }

    /// Stop background loops. In-flight steps settle through the queue's
    /// at-least-once semantics on the next start.
    pub fn shutdown(&self) {
        if let Some(relay) = &self.relay {
            relay.shutdown();
        }
        self.queue.shutdown();
        tracing::info!("runtime shut down");
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

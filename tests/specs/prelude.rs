// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: an in-process control plane on memory drivers.

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use fm_api::{Api, CreateRunRequest, ResolveGateRequest};
pub use fm_core::{GateStatus, Plan, PlanStep, RunStatus, StepStatus, UserContext, UserTier};
pub use fm_engine::{EngineConfig, RunEngine};
pub use fm_llm::{providers::StaticProvider, Router, RouterConfig};
pub use fm_queue::{MemoryQueue, Queue};
pub use fm_store::{FsStore, Store};
pub use fm_worker::{tools::builtin_registry, RunnerConfig, StepRunner};
pub use serde_json::json;

pub const SPEC_WAIT: Duration = Duration::from_secs(15);

pub struct Plane {
    _dir: tempfile::TempDir,
    pub api: Api,
    pub engine: Arc<RunEngine>,
    pub queue: Arc<MemoryQueue>,
    pub runner: Arc<StepRunner>,
}

pub struct PlaneOptions {
    pub engine_config: EngineConfig,
    pub router: Arc<Router>,
    /// Subscribe the runner to `step.ready`. With a single-slot queue the
    /// plan's steps process strictly in order.
    pub subscribe_worker: bool,
    pub concurrency: usize,
}

impl Default for PlaneOptions {
    fn default() -> Self {
        Self {
            engine_config: EngineConfig::default(),
            router: offline_router("five seven five"),
            subscribe_worker: true,
            concurrency: 1,
        }
    }
}

/// Router with a single canned provider, no network.
pub fn offline_router(text: &str) -> Arc<Router> {
    let mut providers = fm_llm::ProviderRegistry::new();
    providers.register(
        fm_llm::ProviderDescriptor {
            name: "openai".to_string(),
            active: true,
            default_model: "gpt-4o-mini".to_string(),
            models: vec!["gpt-4o-mini".to_string()],
        },
        Arc::new(StaticProvider::new("openai", text)),
    );
    Arc::new(Router::new(providers, RouterConfig::default()))
}

pub async fn start_plane() -> Plane {
    start_plane_with(PlaneOptions::default()).await
}

pub async fn start_plane_with(options: PlaneOptions) -> Plane {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FsStore::open(dir.path()).unwrap());
    let queue = Arc::new(MemoryQueue::with_concurrency(options.concurrency));
    let engine = RunEngine::new(
        Arc::clone(&store),
        Arc::clone(&queue) as Arc<dyn Queue>,
        options.engine_config,
    );
    let runner = StepRunner::new(
        Arc::clone(&store),
        Arc::clone(&queue) as Arc<dyn Queue>,
        engine.timeline().clone(),
        Arc::clone(engine.cancels()),
        builtin_registry(options.router),
        RunnerConfig::default(),
    );
    engine.set_executor(Arc::clone(&runner) as Arc<dyn fm_engine::StepExecutor>);
    if options.subscribe_worker {
        StepRunner::subscribe(&runner).await.unwrap();
    }
    Plane { _dir: dir, api: Api::new(Arc::clone(&engine)), engine, queue, runner }
}

pub fn spec_user() -> Option<UserContext> {
    Some(UserContext::new("user-spec", UserTier::Pro))
}

pub fn plan_request(plan: Plan) -> CreateRunRequest {
    CreateRunRequest { plan: Some(plan), ..Default::default() }
}

/// Poll until the run reaches `status` (or fail after the spec budget).
pub async fn wait_run_status(api: &Api, run_id: &str, status: RunStatus) {
    let deadline = Instant::now() + SPEC_WAIT;
    loop {
        let detail = api.get_run(run_id).await.unwrap();
        if detail.run.status == status {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "run {run_id} stuck in {:?}, wanted {status:?}",
            detail.run.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Event types of a run's timeline, in sequence order.
pub async fn timeline_types(api: &Api, run_id: &str) -> Vec<String> {
    api.timeline(run_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type.to_string())
        .collect()
}

/// Assert `needles` appear in `haystack` in order (not necessarily
/// adjacent).
pub fn assert_subsequence(haystack: &[String], needles: &[&str]) {
    let mut iter = haystack.iter();
    for needle in needles {
        assert!(
            iter.any(|h| h == needle),
            "expected {needle:?} (in order) within {haystack:?}"
        );
    }
}

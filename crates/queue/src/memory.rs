// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process cooperative queue driver.
//!
//! Enqueues buffer per topic; one consumer task per subscribed topic pops
//! due jobs and runs handlers on a bounded pool. Delays use local timers.
//! Suited to single-process deployments and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use fm_core::{JobId, StepId};

use crate::backoff::{retry_delay, MAX_ATTEMPTS};
use crate::queue::{
    dlq_topic_for, topics, Delivery, DlqEntry, EnqueueOpts, HandlerError, JobHandler, Queue,
    QueueError,
};

#[derive(Debug, Clone)]
struct PendingJob {
    id: JobId,
    payload: Value,
    attempt: u32,
    enqueued_at: Instant,
    available_at: Instant,
}

#[derive(Default)]
struct TopicState {
    pending: Vec<PendingJob>,
    subscriber: Option<Arc<dyn JobHandler>>,
    consumer_running: bool,
    dlq: Vec<DlqEntry>,
}

struct QueueInner {
    topics: Mutex<IndexMap<String, TopicState>>,
    /// One Notify per topic name; kept separate from `topics` so waiters
    /// never hold the state lock.
    wakers: Mutex<IndexMap<String, Arc<Notify>>>,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
}

enum Next {
    Deliver(PendingJob, Arc<dyn JobHandler>),
    Sleep(Duration),
    Idle,
}

impl QueueInner {
    fn waker(&self, topic: &str) -> Arc<Notify> {
        self.wakers.lock().entry(topic.to_string()).or_default().clone()
    }

    fn next_action(&self, topic: &str) -> Next {
        let mut topics = self.topics.lock();
        let Some(state) = topics.get_mut(topic) else {
            return Next::Idle;
        };
        let Some(handler) = state.subscriber.clone() else {
            return Next::Idle;
        };
        let now = Instant::now();
        let due = state
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, job)| job.available_at)
            .map(|(i, job)| (i, job.available_at));
        match due {
            Some((index, available_at)) if available_at <= now => {
                let job = state.pending.remove(index);
                Next::Deliver(job, handler)
            }
            Some((_, available_at)) => Next::Sleep(available_at - now),
            None => Next::Idle,
        }
    }

    /// Reschedule a nacked job or move it to the dead-letter queue.
    fn nack(&self, topic: &str, job: PendingJob, error: &HandlerError) {
        let mut topics = self.topics.lock();
        if job.attempt >= MAX_ATTEMPTS {
            let dlq_topic = dlq_topic_for(topic);
            tracing::warn!(
                topic,
                job = %job.id,
                attempts = job.attempt,
                error = %error,
                "job dead-lettered"
            );
            topics.entry(dlq_topic).or_default().dlq.push(DlqEntry {
                job_id: job.id,
                source_topic: topic.to_string(),
                payload: job.payload,
                attempts: job.attempt,
                last_error: error.to_string(),
                dead_at: Utc::now(),
            });
            return;
        }
        let delay = retry_delay(job.attempt);
        let next_attempt = job.attempt + 1;
        tracing::debug!(
            topic,
            job = %job.id,
            attempt = next_attempt,
            delay_ms = delay.as_millis() as u64,
            "job rescheduled"
        );
        if let Some(state) = topics.get_mut(topic) {
            state.pending.push(PendingJob {
                attempt: next_attempt,
                available_at: Instant::now() + delay,
                ..job
            });
        }
    }
}

/// Single-process queue driver.
pub struct MemoryQueue {
    inner: Arc<QueueInner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_concurrency(4)
    }

    /// `concurrency` bounds handler executions in flight across topics.
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                topics: Mutex::new(IndexMap::new()),
                wakers: Mutex::new(IndexMap::new()),
                slots: Arc::new(Semaphore::new(concurrency.max(1))),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Stop consumer tasks. Pending jobs stay buffered.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn spawn_consumer(&self, topic: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let waker = inner.waker(&topic);
            loop {
                if inner.shutdown.is_cancelled() {
                    break;
                }
                match inner.next_action(&topic) {
                    Next::Deliver(job, handler) => {
                        let Ok(permit) = Arc::clone(&inner.slots).acquire_owned().await else {
                            break;
                        };
                        let inner = Arc::clone(&inner);
                        let topic = topic.clone();
                        tokio::spawn(async move {
                            let delivery = Delivery {
                                id: job.id,
                                topic: topic.as_str().into(),
                                payload: job.payload.clone(),
                                attempt: job.attempt,
                            };
                            match handler.handle(delivery).await {
                                Ok(()) => {}
                                Err(err) => {
                                    inner.nack(&topic, job, &err);
                                    inner.waker(&topic).notify_one();
                                }
                            }
                            drop(permit);
                        });
                    }
                    Next::Sleep(dur) => {
                        tokio::select! {
                            _ = tokio::time::sleep(dur) => {}
                            _ = waker.notified() => {}
                            _ = inner.shutdown.cancelled() => break,
                        }
                    }
                    Next::Idle => {
                        tokio::select! {
                            _ = waker.notified() => {}
                            _ = inner.shutdown.cancelled() => break,
                        }
                    }
                }
            }
        });
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        opts: EnqueueOpts,
    ) -> Result<JobId, QueueError> {
        let id = JobId::new();
        let now = Instant::now();
        {
            let mut topics = self.inner.topics.lock();
            topics.entry(topic.to_string()).or_default().pending.push(PendingJob {
                id,
                payload,
                attempt: opts.attempt.unwrap_or(1),
                enqueued_at: now,
                available_at: now + Duration::from_millis(opts.delay_ms),
            });
        }
        self.inner.waker(topic).notify_one();
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), QueueError> {
        let start_consumer = {
            let mut topics = self.inner.topics.lock();
            let state = topics.entry(topic.to_string()).or_default();
            state.subscriber = Some(handler);
            let start = !state.consumer_running;
            state.consumer_running = true;
            start
        };
        if start_consumer {
            self.spawn_consumer(topic.to_string());
        }
        self.inner.waker(topic).notify_one();
        Ok(())
    }

    fn has_subscribers(&self, topic: &str) -> bool {
        self.inner.topics.lock().get(topic).map(|t| t.subscriber.is_some()).unwrap_or(false)
    }

    async fn oldest_age_ms(&self, topic: &str) -> Result<Option<u64>, QueueError> {
        let topics = self.inner.topics.lock();
        Ok(topics.get(topic).and_then(|state| {
            state
                .pending
                .iter()
                .map(|job| job.enqueued_at)
                .min()
                .map(|oldest| oldest.elapsed().as_millis() as u64)
        }))
    }

    async fn list_dlq(&self, dlq_topic: &str) -> Result<Vec<DlqEntry>, QueueError> {
        let topics = self.inner.topics.lock();
        Ok(topics.get(dlq_topic).map(|t| t.dlq.clone()).unwrap_or_default())
    }

    async fn rehydrate_dlq(&self, dlq_topic: &str, n: usize) -> Result<usize, QueueError> {
        let entries: Vec<DlqEntry> = {
            let mut topics = self.inner.topics.lock();
            let Some(state) = topics.get_mut(dlq_topic) else {
                return Ok(0);
            };
            let take = n.min(state.dlq.len());
            state.dlq.drain(..take).collect()
        };
        let count = entries.len();
        for entry in entries {
            self.enqueue(&entry.source_topic, entry.payload, EnqueueOpts::default()).await?;
        }
        Ok(count)
    }

    async fn drop_pending_step(&self, step_id: &StepId) -> Result<usize, QueueError> {
        let mut map = self.inner.topics.lock();
        let Some(state) = map.get_mut(topics::STEP_READY) else {
            return Ok(0);
        };
        let before = state.pending.len();
        state.pending.retain(|job| {
            job.payload.get("stepId").and_then(|v| v.as_str()) != Some(step_id.as_str())
        });
        Ok(before - state.pending.len())
    }

    fn driver_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbox relay: drains staged entries onto their queue topics after the
//! local write has committed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fm_queue::{EnqueueOpts, Queue};
use fm_resilience::TimedMutex;
use fm_store::Store;

use crate::error::EngineError;

const RELAY_INTERVAL: Duration = Duration::from_millis(500);
const RELAY_BATCH: usize = 50;

/// Background publisher for outbox entries.
pub struct OutboxRelay {
    store: Arc<dyn Store>,
    queue: Arc<dyn Queue>,
    /// Take-then-mark cannot be expressed as a store-level CAS, so
    /// concurrent pumps (loop + manual trigger) serialise here.
    pump_lock: TimedMutex,
    shutdown: CancellationToken,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn Queue>) -> Self {
        Self {
            store,
            queue,
            pump_lock: TimedMutex::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish one batch. Returns how many entries were relayed.
    pub async fn pump_once(&self) -> Result<usize, EngineError> {
        self.pump_lock
            .run_exclusive(async {
                let entries = self.store.take_unpublished_outbox(RELAY_BATCH).await?;
                let mut published = 0;
                for entry in entries {
                    self.queue
                        .enqueue(&entry.topic, entry.payload, EnqueueOpts::default())
                        .await?;
                    self.store.mark_outbox_published(&entry.id).await?;
                    published += 1;
                }
                if published > 0 {
                    tracing::debug!(published, "outbox relayed");
                }
                Ok(published)
            })
            .await
    }

    /// Run the relay until shutdown.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(err) = self.pump_once().await {
                    tracing::warn!(error = %err, "outbox pump failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(RELAY_INTERVAL) => {}
                    _ = self.shutdown.cancelled() => break,
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only timeline with a live broadcast bus.
//!
//! Every recorded event goes three places: the store (durable, sequenced),
//! the outbox (for `event.out` publication), and the broadcast channel
//! (live streams). Consumers that miss broadcast events catch up through
//! [`Timeline::replay`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use fm_core::{EventRecord, RunId, StepId};
use fm_queue::topics;
use fm_store::{Store, StoreError};

const BUS_CAPACITY: usize = 256;

/// Event recorder shared by the engine and the runner.
#[derive(Clone)]
pub struct Timeline {
    store: Arc<dyn Store>,
    bus: broadcast::Sender<EventRecord>,
}

impl Timeline {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self { store, bus }
    }

    /// Record an event: persist, stage for publication, push to the bus.
    /// Returns the allocated sequence number.
    pub async fn record(
        &self,
        run_id: &RunId,
        event_type: &str,
        payload: Value,
        step_id: Option<&StepId>,
    ) -> Result<u64, StoreError> {
        let seq = self.store.record_event(run_id, event_type, payload.clone(), step_id).await?;
        let record = EventRecord {
            run_id: *run_id,
            seq,
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            step_id: step_id.copied(),
            payload,
        };
        tracing::info!("{}", record.log_summary());

        if let Err(err) = self
            .store
            .put_outbox(topics::EVENT_OUT, serde_json::to_value(&record).unwrap_or_default())
            .await
        {
            // The durable event already exists; outbox publication is
            // best-effort and retried by the relay on later events.
            tracing::warn!(run = %run_id, error = %err, "outbox staging failed");
        }

        // Send fails only when nobody is subscribed
        let _ = self.bus.send(record);
        Ok(seq)
    }

    /// Live event feed. Slow subscribers may observe `Lagged` and should
    /// resync via [`Timeline::replay`].
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.bus.subscribe()
    }

    /// Catch-up read of a run's events after `since_seq`.
    pub async fn replay(
        &self,
        run_id: &RunId,
        since_seq: Option<u64>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.store.list_events(run_id, since_seq).await
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live run streams: the behaviour behind `GET /runs/:id/stream`.
//!
//! The transport renders items as server-sent events; here they are a
//! plain channel. The stream opens with `Connected`, pushes every
//! timeline event for the run, and keeps the connection warm with pings.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use fm_core::{EventRecord, RunId};
use fm_engine::Timeline;

/// Keepalive cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// One item on a run stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItem {
    Connected,
    Ping,
    Event(EventRecord),
}

/// Receiver half of a live run stream. Dropping it disconnects.
#[derive(Debug)]
pub struct RunStream {
    rx: mpsc::Receiver<StreamItem>,
}

impl RunStream {
    /// Attach to the timeline bus for one run.
    pub fn open(timeline: Timeline, run_id: RunId) -> Self {
        Self::open_with_ping(timeline, run_id, PING_INTERVAL)
    }

    /// Ping cadence override for tests.
    pub fn open_with_ping(timeline: Timeline, run_id: RunId, ping_every: Duration) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let mut bus = timeline.subscribe();

        tokio::spawn(async move {
            if tx.send(StreamItem::Connected).await.is_err() {
                return;
            }
            let mut ping = tokio::time::interval(ping_every);
            ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ping.tick().await; // first tick fires immediately; swallow it
            loop {
                tokio::select! {
                    _ = ping.tick() => {
                        if tx.send(StreamItem::Ping).await.is_err() {
                            break;
                        }
                    }
                    received = bus.recv() => match received {
                        Ok(event) if event.run_id == run_id => {
                            if tx.send(StreamItem::Event(event)).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(run = %run_id, skipped, "stream lagged behind the bus");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Self { rx }
    }

    /// Next item; `None` once the producer side is gone.
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL journal backing the filesystem driver.
//!
//! Every mutation is one line; the in-memory view is rebuilt by replaying
//! the journal on open. Appends are flushed before the in-memory state is
//! touched, so a crash can lose at most the mutation in flight.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fm_core::{Artifact, EventRecord, Gate, OutboxId, Run, RunId, RunStatus, Step};

use crate::error::StoreError;
use crate::store::OutboxEntry;

/// One journaled mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalRecord {
    RunCreated {
        run: Run,
    },
    RunStatusChanged {
        id: RunId,
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ended_at: Option<DateTime<Utc>>,
    },
    StepCreated {
        step: Step,
    },
    /// Full-row rewrite; also covers lease transitions and retry resets.
    StepUpdated {
        step: Step,
    },
    EventRecorded {
        event: EventRecord,
    },
    GateCreated {
        gate: Gate,
    },
    GateUpdated {
        gate: Gate,
    },
    ArtifactAdded {
        artifact: Artifact,
    },
    OutboxPut {
        entry: OutboxEntry,
    },
    OutboxPublished {
        id: OutboxId,
        at: DateTime<Utc>,
    },
    InboxSeen {
        consumer: String,
        key: String,
        at: DateTime<Utc>,
    },
}

/// Flushing JSONL writer over the journal file.
pub(crate) struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl Journal {
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { writer: BufWriter::new(file), path: path.to_path_buf() })
    }

    pub(crate) fn append(&mut self, record: &JournalRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Replay every readable record. Malformed lines are skipped with a
    /// warning; a truncated tail line is expected after a crash.
    pub(crate) fn replay(path: &Path) -> Result<Vec<JournalRecord>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %err,
                        "skipping unreadable journal line"
                    );
                }
            }
        }
        Ok(records)
    }

    #[allow(dead_code)]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

// src/models/counters.rs

//! Live progress counters shared by every fetch worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of processing a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First write for this key
    Written,
    /// Replaced an older snapshot for this key
    Updated,
    /// Not written for any reason
    Skipped,
}

/// Written/updated/skipped counters owned by one pipeline run.
#[derive(Debug, Default)]
pub struct DownloadCounters {
    written: AtomicU64,
    updated: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`DownloadCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub written: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl CounterSnapshot {
    pub fn total(&self) -> u64 {
        self.written + self.updated + self.skipped
    }
}

impl DownloadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record outcome.
    pub fn record(&self, outcome: RecordOutcome) {
        let counter = match outcome {
            RecordOutcome::Written => &self.written,
            RecordOutcome::Updated => &self.updated,
            RecordOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            written: self.written.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

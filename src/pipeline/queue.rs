// src/pipeline/queue.rs

//! Bounded single-producer, multi-consumer record queue.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::models::CdxRecord;
use crate::utils::CancelToken;

/// Create a queue holding at most `capacity` records in flight.
pub fn record_queue(capacity: usize) -> (mpsc::Sender<CdxRecord>, RecordQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        tx,
        RecordQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Consumer side of the queue, shared by every worker.
///
/// Each record is handed to exactly one caller of [`recv`](Self::recv).
#[derive(Debug, Clone)]
pub struct RecordQueue {
    rx: Arc<Mutex<mpsc::Receiver<CdxRecord>>>,
}

impl RecordQueue {
    /// Next record, or `None` once the queue is closed and drained or
    /// `cancel` fires.
    pub async fn recv(&self, cancel: &CancelToken) -> Option<CdxRecord> {
        let mut rx = tokio::select! {
            rx = self.rx.lock() => rx,
            _ = cancel.cancelled() => return None,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            record = rx.recv() => record,
        }
    }
}

// src/pipeline/worker.rs

use std::sync::Arc;

use crate::models::DownloadCounters;
use crate::pipeline::queue::RecordQueue;
use crate::services::Fetcher;
use crate::utils::CancelToken;

/// Consume records until the queue is drained or `cancel` fires.
///
/// A record that was already taken from the queue is always processed to
/// completion.
pub async fn run_worker(
    id: usize,
    fetcher: Arc<Fetcher>,
    queue: RecordQueue,
    counters: Arc<DownloadCounters>,
    cancel: CancelToken,
) {
    log::debug!("Worker {} started", id);

    while let Some(record) = queue.recv(&cancel).await {
        let outcome = fetcher.process(&record).await;
        counters.record(outcome);
    }

    log::debug!("Exiting worker {}", id);
}

// src/pipeline/download.rs

//! One download run: listing producer, scaled fetch workers and ledger
//! checkpointing wired together.

use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, CounterSnapshot, DownloadCounters, DownloadRequest};
use crate::pipeline::producer::ListingProducer;
use crate::pipeline::queue::record_queue;
use crate::pipeline::scaler::{PoolScaler, ScalerSettings};
use crate::pipeline::worker::run_worker;
use crate::resilience::{RateLimiter, ResilientClient, create_dir_with_retry};
use crate::services::{CdxClient, Fetcher, ListingQuery};
use crate::storage::{Ledger, PathLockRegistry, PathShortener, spawn_checkpointer};
use crate::utils::{CancelToken, Transport};

/// Result of a finished (or cancelled) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub counters: CounterSnapshot,
    /// Records the listing handed to the queue
    pub records_listed: u64,
    /// Fetch workers spawned by the scaler
    pub workers: usize,
    pub cancelled: bool,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Written: {}, Updated: {}, Skipped: {} ({} records listed, {} workers{})",
            self.counters.written,
            self.counters.updated,
            self.counters.skipped,
            self.records_listed,
            self.workers,
            if self.cancelled { ", cancelled" } else { "" }
        )
    }
}

/// Owns the shared state of a run and drives it to completion.
pub struct DownloadPipeline {
    config: Config,
    transport: Arc<dyn Transport>,
    ledger: Arc<dyn Ledger>,
    counters: Arc<DownloadCounters>,
    locks: Arc<PathLockRegistry>,
    shortener: Arc<PathShortener>,
}

impl DownloadPipeline {
    pub fn new(config: Config, transport: Arc<dyn Transport>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            config,
            transport,
            ledger,
            counters: Arc::new(DownloadCounters::new()),
            locks: Arc::new(PathLockRegistry::new()),
            shortener: Arc::new(PathShortener::default()),
        }
    }

    /// Live counters, readable while [`run`](Self::run) is in progress.
    pub fn counters(&self) -> Arc<DownloadCounters> {
        Arc::clone(&self.counters)
    }

    /// Download the history described by `request`.
    ///
    /// Cancellation is not an error: the run winds down, checkpoints the
    /// ledger and returns a summary with `cancelled` set. A failed
    /// checkpoint cancels `cancel` and fails the run.
    pub async fn run(&self, request: &DownloadRequest, cancel: &CancelToken) -> Result<DownloadSummary> {
        request.validate()?;

        if request.clear_history {
            log::info!("Clearing download history");
            self.ledger.purge()?;
        }

        let stop = CancelToken::new();
        let checkpointer = spawn_checkpointer(
            self.ledger.clone(),
            self.config.ledger.checkpoint_interval(),
            stop.clone(),
            cancel.clone(),
        );

        let result = match self.execute(request, cancel).await {
            Err(AppError::Cancelled) => Ok(DownloadSummary {
                counters: self.counters.snapshot(),
                records_listed: 0,
                workers: 0,
                cancelled: true,
            }),
            other => other,
        };
        if result.is_err() {
            cancel.cancel();
        }

        stop.cancel();
        let checkpointed = match checkpointer.await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        let finalized = self.ledger.checkpoint().await;

        let summary = result?;
        checkpointed?;
        finalized?;

        log::info!("Download finished. {}", summary);
        Ok(summary)
    }

    async fn execute(&self, request: &DownloadRequest, cancel: &CancelToken) -> Result<DownloadSummary> {
        create_dir_with_retry(&request.output_dir, &self.config.directory, cancel).await?;

        let listing = Arc::new(ResilientClient::new(
            "listing",
            self.transport.clone(),
            Arc::new(RateLimiter::per_second(self.config.listing.requests_per_second)),
            self.config.listing.retry.clone(),
            self.config.circuit_breaker.clone(),
        ));
        let fetch_limiter = Arc::new(RateLimiter::per_second(request.rate_limit));
        let fetch = Arc::new(ResilientClient::new(
            "fetch",
            self.transport.clone(),
            fetch_limiter.clone(),
            self.config.fetch.retry.clone(),
            self.config.circuit_breaker.clone(),
        ));

        let fetcher = Arc::new(Fetcher::new(
            fetch,
            self.ledger.clone(),
            self.locks.clone(),
            self.shortener.clone(),
            request.page_filters.clone(),
            &request.output_dir,
            &self.config.archive.archive_host,
            self.config.directory.clone(),
        ));

        let (tx, queue) = record_queue(self.config.pipeline.queue_capacity);
        let producer = Arc::new(ListingProducer::new(CdxClient::new(
            listing,
            &self.config.archive.index_host,
        )));
        let mut signal = producer.signal();

        log::info!("Fetching snapshot list for {}", request.match_url);
        let producer_task = {
            let producer = producer.clone();
            let query = ListingQuery::from_request(request);
            let cancel = cancel.clone();
            tokio::spawn(async move { producer.run(&query, tx, &cancel).await })
        };

        let scaler = PoolScaler::new(
            ScalerSettings::new(&self.config.pipeline, request.rate_limit),
            fetch_limiter,
        );
        let mut next_id = 0usize;
        let pool = scaler
            .supervise(&mut signal, cancel, || {
                next_id += 1;
                log::debug!("Starting worker {}", next_id);
                tokio::spawn(run_worker(
                    next_id,
                    fetcher.clone(),
                    queue.clone(),
                    self.counters.clone(),
                    cancel.clone(),
                ))
            })
            .await;
        let workers = pool.len();
        log::debug!("Worker pool settled at {} workers", workers);

        let records_listed = producer_task.await?;
        pool.wait_for_completion().await?;

        Ok(DownloadSummary {
            counters: self.counters.snapshot(),
            records_listed,
            workers,
            cancelled: cancel.is_cancelled(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::storage::SledLedger;
    use crate::utils::MockTransport;
    use crate::utils::mock::MOCK_RECORD_COUNT;

    fn config() -> Config {
        let mut config = Config::default();
        config.pipeline.scale_interval_ms = 50;
        config
    }

    fn request(dir: &TempDir) -> DownloadRequest {
        let mut request = DownloadRequest::new("archive.org/about", dir.path().join("out"));
        request.rate_limit = 100;
        request
    }

    fn pipeline(ledger: Arc<SledLedger>) -> DownloadPipeline {
        DownloadPipeline::new(config(), Arc::new(MockTransport::new()), ledger)
    }

    #[tokio::test]
    async fn downloads_mock_listing_then_skips_it_on_rerun() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SledLedger::temporary().unwrap());

        let first = pipeline(ledger.clone())
            .run(&request(&dir), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(first.records_listed, MOCK_RECORD_COUNT as u64);
        assert_eq!(first.counters.total(), MOCK_RECORD_COUNT as u64);
        assert!(first.counters.written >= 4);
        assert!(first.workers >= 1);
        assert!(!first.cancelled);
        assert_eq!(ledger.len(), 4);

        let second = pipeline(ledger.clone())
            .run(&request(&dir), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(second.counters.skipped, MOCK_RECORD_COUNT as u64);
        assert_eq!(second.counters.written + second.counters.updated, 0);
    }

    #[tokio::test]
    async fn clear_history_downloads_everything_again() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SledLedger::temporary().unwrap());
        pipeline(ledger.clone())
            .run(&request(&dir), &CancelToken::new())
            .await
            .unwrap();

        let mut rerun = request(&dir);
        rerun.clear_history = true;
        let summary = pipeline(ledger.clone())
            .run(&rerun, &CancelToken::new())
            .await
            .unwrap();
        assert!(summary.counters.written >= 4);
        assert_eq!(summary.counters.updated, 0);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_any_work() {
        let dir = TempDir::new().unwrap();
        let mut request = request(&dir);
        request.limit = Some(0);

        let result = pipeline(Arc::new(SledLedger::temporary().unwrap()))
            .run(&request, &CancelToken::new())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn cancellation_ends_the_run_gracefully() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(Arc::new(SledLedger::temporary().unwrap()));
        let cancel = CancelToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };

        let summary = pipeline.run(&request(&dir), &cancel).await.unwrap();
        canceller.await.unwrap();

        assert!(summary.cancelled);
        assert!(summary.counters.total() <= MOCK_RECORD_COUNT as u64);
    }
}

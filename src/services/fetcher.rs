// src/services/fetcher.rs

//! Per-record download: dedup, lock, fetch, filter and write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{CdxRecord, PageFilters, RecordOutcome};
use crate::resilience::{ResilientClient, RetryPolicy, create_dir_with_retry};
use crate::storage::{DedupKey, Ledger, PathLockRegistry, PathShortener};
use crate::utils::{CancelToken, HttpResponse, normalize_path};

/// Shared state every fetch worker writes through.
pub struct Fetcher {
    client: Arc<ResilientClient>,
    ledger: Arc<dyn Ledger>,
    locks: Arc<PathLockRegistry>,
    shortener: Arc<PathShortener>,
    page_filters: PageFilters,
    output_dir: PathBuf,
    archive_host: String,
    directory_retry: RetryPolicy,
}

/// Aborts the wrapped task when dropped.
struct FetchTask(JoinHandle<Result<HttpResponse>>);

impl Drop for FetchTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Fetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<ResilientClient>,
        ledger: Arc<dyn Ledger>,
        locks: Arc<PathLockRegistry>,
        shortener: Arc<PathShortener>,
        page_filters: PageFilters,
        output_dir: impl Into<PathBuf>,
        archive_host: impl Into<String>,
        directory_retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            ledger,
            locks,
            shortener,
            page_filters,
            output_dir: output_dir.into(),
            archive_host: archive_host.into(),
            directory_retry,
        }
    }

    /// Download one record. Every failure is logged and reported as
    /// [`RecordOutcome::Skipped`].
    ///
    /// Once started, the download runs to completion even if the run is
    /// cancelled, so no file is left half written.
    pub async fn process(&self, record: &CdxRecord) -> RecordOutcome {
        match self.try_process(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Failed to download '{}': {}", record.original, e);
                RecordOutcome::Skipped
            }
        }
    }

    async fn try_process(&self, record: &CdxRecord) -> Result<RecordOutcome> {
        let normalized = match normalize_path(&record.original) {
            Ok(path) => path,
            Err(e) => {
                log::warn!(
                    "URL '{}' could not be converted to a valid file path and will be skipped: {}",
                    record.original,
                    e
                );
                return Ok(RecordOutcome::Skipped);
            }
        };
        log::debug!("URL '{}' transformed to {}", record.original, normalized);

        let key = DedupKey::new(&record.url_key, &normalized);
        let previous = self.ledger.get(&key)?;
        if previous.is_some_and(|ts| ts >= record.timestamp) {
            log::debug!(
                "A more up-to-date version of '{}' has already been downloaded. Page will be skipped.",
                record.original
            );
            return Ok(RecordOutcome::Skipped);
        }

        let write_path = self.write_path(&normalized);
        let _guard = self.locks.acquire(&write_path.to_string_lossy()).await;

        log::debug!("Starting download of page at {}", record.original);
        let detached = CancelToken::new();
        let fetch = {
            let client = self.client.clone();
            let url = record.archive_url(&self.archive_host);
            let cancel = detached.clone();
            FetchTask(tokio::spawn(async move { client.get(&url, &cancel).await }))
        };

        let file = self.open_destination(&write_path, &detached).await?;

        // Another worker may have stored a newer snapshot while we waited.
        if self.ledger.get(&key)?.is_some_and(|ts| ts >= record.timestamp) {
            log::debug!(
                "A newer snapshot of '{}' was written concurrently. Page will be skipped.",
                record.original
            );
            return Ok(RecordOutcome::Skipped);
        }

        let response = {
            let mut fetch = fetch;
            (&mut fetch.0).await??
        };
        if !response.is_success() {
            log::warn!(
                "Request for page '{}' was unsuccessful. StatusCode: {}",
                record.original,
                response.status()
            );
            return Ok(RecordOutcome::Skipped);
        }

        if self.page_filters.any() {
            if !self.write_filtered(file, response, &write_path).await? {
                log::debug!("Page '{}' did not match any page filter", record.original);
                return Ok(RecordOutcome::Skipped);
            }
            log::info!(
                "Written filtered page {}, {}, timestamp: {}",
                write_path.display(),
                record.original,
                record.timestamp
            );
        } else {
            write_stream(file, response).await?;
            log::info!(
                "Written page {}, {}, timestamp: {}",
                write_path.display(),
                record.original,
                record.timestamp
            );
        }

        self.ledger.upsert(&key, record.timestamp)?;

        Ok(if previous.is_some() {
            RecordOutcome::Updated
        } else {
            RecordOutcome::Written
        })
    }

    /// Full output path for `normalized`, shortened if it is too long.
    fn write_path(&self, normalized: &str) -> PathBuf {
        let full = self.output_dir.join(normalized);
        let full = full.to_string_lossy();
        if !self.shortener.needs_shortening(&full) {
            return PathBuf::from(full.as_ref());
        }
        let shortened = self.shortener.shorten(&full);
        log::debug!(
            "Transformed path {} was too long, and was shortened to {}.",
            full,
            shortened
        );
        PathBuf::from(shortened)
    }

    /// Create the parent directory and open `path` for writing without
    /// truncating it.
    async fn open_destination(&self, path: &Path, cancel: &CancelToken) -> Result<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_with_retry(parent, &self.directory_retry, cancel).await?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;
        Ok(file)
    }

    /// Buffer the body and keep it only if it matches a page filter.
    async fn write_filtered(&self, mut file: File, response: HttpResponse, path: &Path) -> Result<bool> {
        let body = response.bytes().await?;
        if !self.page_filters.is_match(&String::from_utf8_lossy(&body)) {
            drop(file);
            tokio::fs::remove_file(path).await?;
            return Ok(false);
        }

        file.set_len(0).await?;
        file.write_all(&body).await?;
        finish(file).await?;
        Ok(true)
    }
}

/// Stream the body straight into `file`.
async fn write_stream(mut file: File, response: HttpResponse) -> Result<()> {
    file.set_len(0).await?;
    let mut body = response.into_stream();
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    finish(file).await
}

async fn finish(mut file: File) -> Result<()> {
    file.flush().await?;
    file.sync_all().await.map_err(AppError::from)
}

// src/pipeline/producer.rs

//! Listing producer: moves records from the index listing into the queue.

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::models::CdxRecord;
use crate::services::{CdxClient, ListingQuery};
use crate::utils::CancelToken;

/// Progress of the listing as seen by the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStatus {
    /// No record emitted yet
    Pending,
    /// At least one record emitted
    Streaming,
    /// Queue closed after emitting `records`
    Finished { records: u64 },
}

/// Receiver side of the producer's status, latched on the first record.
#[derive(Debug, Clone)]
pub struct ListingSignal {
    rx: watch::Receiver<ListingStatus>,
}

impl ListingSignal {
    pub fn new(rx: watch::Receiver<ListingStatus>) -> Self {
        Self { rx }
    }

    pub fn status(&self) -> ListingStatus {
        *self.rx.borrow()
    }

    /// Whether at least one record has been emitted.
    pub fn has_emitted(&self) -> bool {
        match self.status() {
            ListingStatus::Pending => false,
            ListingStatus::Streaming => true,
            ListingStatus::Finished { records } => records > 0,
        }
    }

    /// Wait until the first record is emitted.
    ///
    /// Returns `false` if the listing finished empty or `cancel` fired first.
    pub async fn wait_for_first_record(&mut self, cancel: &CancelToken) -> bool {
        tokio::select! {
            status = self.rx.wait_for(|s| *s != ListingStatus::Pending) => status
                .map(|s| *s != ListingStatus::Finished { records: 0 })
                .unwrap_or(false),
            _ = cancel.cancelled() => false,
        }
    }
}

/// Drives the listing client and feeds the bounded queue.
pub struct ListingProducer {
    cdx: CdxClient,
    status: watch::Sender<ListingStatus>,
}

impl ListingProducer {
    pub fn new(cdx: CdxClient) -> Self {
        let (status, _) = watch::channel(ListingStatus::Pending);
        Self { cdx, status }
    }

    pub fn signal(&self) -> ListingSignal {
        ListingSignal::new(self.status.subscribe())
    }

    /// Stream the whole listing into `queue`.
    ///
    /// Takes ownership of the queue's only sender, so the queue is closed
    /// exactly once when this returns. Returns the number of records queued.
    pub async fn run(
        &self,
        query: &ListingQuery,
        queue: mpsc::Sender<CdxRecord>,
        cancel: &CancelToken,
    ) -> u64 {
        let records = self.cdx.records(query, cancel);
        self.forward(records, queue, cancel).await
    }

    /// Forward `records` into `queue`, waiting while the queue is full.
    pub async fn forward(
        &self,
        records: impl Stream<Item = CdxRecord>,
        queue: mpsc::Sender<CdxRecord>,
        cancel: &CancelToken,
    ) -> u64 {
        let mut records = std::pin::pin!(records);
        let mut sent = 0u64;

        while let Some(record) = records.next().await {
            if sent == 0 {
                self.status.send_replace(ListingStatus::Streaming);
            }

            let delivered = tokio::select! {
                result = queue.send(record) => result.is_ok(),
                _ = cancel.cancelled() => false,
            };
            if !delivered {
                break;
            }
            sent += 1;

            if cancel.is_cancelled() {
                break;
            }
        }

        if cancel.is_cancelled() {
            log::info!("Listing stopped early after {} records", sent);
        } else {
            log::info!("Finished fetching snapshots ({} records)", sent);
        }

        drop(queue);
        self.status.send_replace(ListingStatus::Finished { records: sent });
        sent
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::stream;

    use super::*;
    use crate::pipeline::queue::record_queue;
    use crate::resilience::{CircuitBreakerConfig, RateLimiter, ResilientClient};
    use crate::utils::MockTransport;

    fn producer() -> ListingProducer {
        let client = ResilientClient::new(
            "listing",
            Arc::new(MockTransport::new()),
            Arc::new(RateLimiter::per_second(1)),
            crate::models::ListingConfig::default().retry,
            CircuitBreakerConfig::default(),
        );
        ListingProducer::new(CdxClient::new(Arc::new(client), "https://web.archive.org"))
    }

    fn records(count: i64) -> impl Stream<Item = CdxRecord> {
        stream::iter((0..count).map(|ts| CdxRecord {
            url_key: "org,archive)/".to_string(),
            timestamp: ts,
            original: format!("http://archive.org/{ts}"),
            mime_type: "text/html".to_string(),
            status_code: 200,
            digest: format!("D{ts}"),
            length: 1,
        }))
    }

    #[tokio::test]
    async fn blocks_when_full_and_delivers_everything_once() {
        let producer = Arc::new(producer());
        let mut signal = producer.signal();
        let (tx, queue) = record_queue(200);
        let cancel = CancelToken::new();

        let task = {
            let producer = producer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { producer.forward(records(250), tx, &cancel).await })
        };

        assert!(signal.wait_for_first_record(&cancel).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished(), "producer should be blocked on a full queue");
        assert_eq!(signal.status(), ListingStatus::Streaming);

        let mut seen = HashSet::new();
        while let Some(record) = queue.recv(&cancel).await {
            assert!(seen.insert(record.timestamp), "duplicate delivery");
        }
        assert_eq!(seen.len(), 250);
        assert_eq!(task.await.unwrap(), 250);
        assert_eq!(signal.status(), ListingStatus::Finished { records: 250 });
    }

    #[tokio::test]
    async fn empty_listing_never_signals_first_record() {
        let producer = producer();
        let mut signal = producer.signal();
        let (tx, queue) = record_queue(4);
        let cancel = CancelToken::new();

        assert_eq!(producer.forward(records(0), tx, &cancel).await, 0);
        assert!(!signal.wait_for_first_record(&cancel).await);
        assert!(queue.recv(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn cancellation_closes_the_queue() {
        let producer = Arc::new(producer());
        let (tx, queue) = record_queue(2);
        let cancel = CancelToken::new();

        let task = {
            let producer = producer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { producer.forward(records(10), tx, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), 2);
        assert!(queue.recv(&CancelToken::new()).await.is_some());
        assert!(queue.recv(&CancelToken::new()).await.is_some());
        assert!(queue.recv(&CancelToken::new()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_listing_from_the_index() {
        let producer = producer();
        let (tx, queue) = record_queue(200);
        let cancel = CancelToken::new();
        let query = ListingQuery {
            match_url: "archive.org/about".to_string(),
            match_type: crate::models::MatchType::Prefix,
            from: None,
            to: None,
            filters: Vec::new(),
            limit: Some(4),
        };

        assert_eq!(producer.run(&query, tx, &cancel).await, 4);
        let mut count = 0;
        while queue.recv(&cancel).await.is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }
}

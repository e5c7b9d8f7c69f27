//! Dedup ledger backed by an embedded log-structured store.
//!
//! Writes go to the store's in-memory log and become durable at the next
//! checkpoint. Opening an existing directory recovers the state of the last
//! completed checkpoint.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{AppError, Result};
use crate::storage::{DedupKey, Ledger};
use crate::utils::CancelToken;

/// Ledger stored in a `sled` database.
#[derive(Clone)]
pub struct SledLedger {
    db: sled::Db,
}

impl SledLedger {
    /// Open (or recover) the ledger stored in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let db = sled::Config::new()
            .path(dir)
            .flush_every_ms(None)
            .open()?;
        log::info!(
            "Opened download ledger at {:?} ({} entries recovered)",
            dir,
            db.len()
        );
        Ok(Self { db })
    }

    /// Ledger that lives only as long as the process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .flush_every_ms(None)
            .open()?;
        Ok(Self { db })
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

fn decode(key: &DedupKey, value: &[u8]) -> Result<i64> {
    <[u8; 8]>::try_from(value)
        .map(i64::from_be_bytes)
        .map_err(|_| AppError::ledger(format!("corrupt entry for key '{}'", key.as_str())))
}

#[async_trait]
impl Ledger for SledLedger {
    fn get(&self, key: &DedupKey) -> Result<Option<i64>> {
        self.db
            .get(key.as_str())?
            .map(|value| decode(key, &value))
            .transpose()
    }

    fn upsert(&self, key: &DedupKey, timestamp: i64) -> Result<()> {
        self.db.insert(key.as_str(), timestamp.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn purge(&self) -> Result<()> {
        let removed = self.db.len();
        self.db.clear()?;
        self.db.flush()?;
        log::info!("Purged download ledger ({} entries)", removed);
        Ok(())
    }

    async fn checkpoint(&self) -> Result<()> {
        let bytes = self.db.flush_async().await?;
        log::debug!("Ledger checkpoint written ({} bytes)", bytes);
        Ok(())
    }
}

/// Checkpoint `ledger` every `interval` until `stop` fires.
///
/// A failed checkpoint cancels `run` and ends the task with the error.
pub fn spawn_checkpointer(
    ledger: Arc<dyn Ledger>,
    interval: Duration,
    stop: CancelToken,
    run: CancelToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = ledger.checkpoint().await {
                        log::error!("Ledger checkpoint failed: {}", e);
                        run.cancel();
                        return Err(e);
                    }
                }
                _ = stop.cancelled() => return Ok(()),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tempfile::TempDir;

    use super::*;

    fn key(path: &str) -> DedupKey {
        DedupKey::new("org,archive)/about", path)
    }

    #[test]
    fn upsert_is_last_write_wins() {
        let ledger = SledLedger::temporary().unwrap();
        ledger.upsert(&key("about.html"), 200).unwrap();
        ledger.upsert(&key("about.html"), 100).unwrap();
        assert_eq!(ledger.get(&key("about.html")).unwrap(), Some(100));
        assert_eq!(ledger.get(&key("missing.html")).unwrap(), None);
    }

    #[test]
    fn lookups_ignore_case() {
        let ledger = SledLedger::temporary().unwrap();
        ledger.upsert(&key("About.html"), 42).unwrap();
        assert_eq!(ledger.get(&key("about.HTML")).unwrap(), Some(42));
    }

    #[tokio::test]
    async fn recovers_checkpointed_state_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = SledLedger::open(dir.path()).unwrap();
            ledger.upsert(&key("a.html"), 20000731030657).unwrap();
            ledger.checkpoint().await.unwrap();
        }

        let reopened = SledLedger::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&key("a.html")).unwrap(), Some(20000731030657));
    }

    #[tokio::test]
    async fn purge_discards_persisted_state() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = SledLedger::open(dir.path()).unwrap();
            ledger.upsert(&key("a.html"), 1).unwrap();
            ledger.checkpoint().await.unwrap();
            ledger.purge().unwrap();
            assert!(ledger.is_empty());
        }

        let reopened = SledLedger::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&key("a.html")).unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_upserts_are_all_visible() {
        let ledger = Arc::new(SledLedger::temporary().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    for j in 0..50 {
                        ledger.upsert(&key(&format!("{i}-{j}.html")), j).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.len(), 400);
    }

    struct CountingLedger {
        checkpoints: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl Ledger for CountingLedger {
        fn get(&self, _key: &DedupKey) -> Result<Option<i64>> {
            Ok(None)
        }
        fn upsert(&self, _key: &DedupKey, _timestamp: i64) -> Result<()> {
            Ok(())
        }
        fn purge(&self) -> Result<()> {
            Ok(())
        }
        async fn checkpoint(&self) -> Result<()> {
            self.checkpoints.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::ledger("disk full"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn checkpointer_runs_on_interval_until_stopped() {
        let ledger = Arc::new(CountingLedger {
            checkpoints: AtomicU32::new(0),
            fail: false,
        });
        let stop = CancelToken::new();
        let handle = spawn_checkpointer(
            ledger.clone(),
            Duration::from_secs(30),
            stop.clone(),
            CancelToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(95)).await;
        stop.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(ledger.checkpoints.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_failure_cancels_the_run() {
        let ledger = Arc::new(CountingLedger {
            checkpoints: AtomicU32::new(0),
            fail: true,
        });
        let run = CancelToken::new();
        let handle = spawn_checkpointer(
            ledger,
            Duration::from_secs(30),
            CancelToken::new(),
            run.clone(),
        );

        assert!(handle.await.unwrap().is_err());
        assert!(run.is_cancelled());
    }
}

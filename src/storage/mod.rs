//! Persistent and in-process state shared by the fetch workers.
//!
//! - `ledger`: crash-recoverable dedup ledger (key -> last written timestamp)
//! - `locks`: per-path write locks
//! - `shortener`: deterministic shortening of over-long output paths
//!
//! ## Ledger layout
//!
//! ```text
//! checkpoints/
//! ├── conf              # store configuration
//! ├── db                # log-structured segments
//! └── snap.*            # latest recovered snapshot
//! ```

pub mod ledger;
pub mod locks;
pub mod shortener;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use ledger::{SledLedger, spawn_checkpointer};
pub use locks::PathLockRegistry;
pub use shortener::PathShortener;

/// Ledger key for one output file of one archived URL.
///
/// Composed of the index's url key and the normalized output path; compared
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(url_key: &str, normalized_path: &str) -> Self {
        Self(format!("{url_key}-{normalized_path}").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Persistent key -> timestamp map.
///
/// `upsert` is last-write-wins; callers that must not regress a timestamp
/// compare against `get` first.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Timestamp last written for `key`, if any.
    fn get(&self, key: &DedupKey) -> Result<Option<i64>>;

    /// Record `timestamp` for `key`, replacing any previous value.
    fn upsert(&self, key: &DedupKey, timestamp: i64) -> Result<()>;

    /// Discard all persisted state.
    fn purge(&self) -> Result<()>;

    /// Durably persist everything written so far.
    async fn checkpoint(&self) -> Result<()>;
}

// src/models/mod.rs

//! Domain models for the downloader.
//!
//! This module contains the data structures shared by the listing, fetch and
//! orchestration layers, organized by their primary purpose.

mod config;
mod counters;
mod filter;
mod record;
mod request;

// Re-export all public types
pub use config::{ArchiveConfig, Config, FetchConfig, LedgerConfig, ListingConfig, PipelineConfig};
pub use counters::{CounterSnapshot, DownloadCounters, RecordOutcome};
pub use filter::{CdxFilter, KNOWN_FIELDS, MatchType, PageFilters};
pub use record::{CDX_FIELD_COUNT, CdxRecord, RecordParseError};
pub use request::DownloadRequest;

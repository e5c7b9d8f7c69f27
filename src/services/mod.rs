//! Service layer for the downloader.
//!
//! - Index listing (`CdxClient`)
//! - Per-record download (`Fetcher`)

pub mod cdx;
pub mod fetcher;

pub use cdx::{CdxClient, ListingQuery};
pub use fetcher::Fetcher;

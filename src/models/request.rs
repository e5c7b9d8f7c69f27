// src/models/request.rs

//! Per-run download request.

use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::models::{CdxFilter, MatchType, PageFilters};
use crate::utils::timestamp::validate_timestamp;

/// Everything that varies between two runs of the downloader.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// URL (or URL pattern) whose history is downloaded
    pub match_url: String,
    pub match_type: MatchType,
    /// Inclusive lower bound of the capture time range
    pub from: Option<i64>,
    /// Inclusive upper bound of the capture time range
    pub to: Option<i64>,
    /// Listing filters sent to the index server
    pub filters: Vec<CdxFilter>,
    /// Absolute cap on the number of records processed
    pub limit: Option<u64>,
    /// Snapshot requests per second
    pub rate_limit: u32,
    pub output_dir: PathBuf,
    /// Body substring filters applied after download
    pub page_filters: PageFilters,
    /// Discard the dedup ledger before starting
    pub clear_history: bool,
}

impl DownloadRequest {
    /// Create a request with default options for `match_url`.
    pub fn new(match_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            match_url: match_url.into(),
            match_type: MatchType::default(),
            from: None,
            to: None,
            filters: Vec::new(),
            limit: None,
            rate_limit: 5,
            output_dir: output_dir.into(),
            page_filters: PageFilters::default(),
            clear_history: false,
        }
    }

    /// Validate the request, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.match_url.trim().is_empty() {
            problems.push("match URL must not be empty.".to_string());
        }
        if let Err(e) = validate_timestamp(self.from, "From") {
            problems.push(e.to_string());
        }
        if let Err(e) = validate_timestamp(self.to, "To") {
            problems.push(e.to_string());
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if widen(from, '0') > widen(to, '9') {
                problems.push("From timestamp must not be after To timestamp.".to_string());
            }
        }
        if self.limit == Some(0) {
            problems.push("--limit-pages must be greater than 0.".to_string());
        }
        if self.rate_limit == 0 {
            problems.push("--rate-limit must be greater than 0.".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(problems.join("\n")))
        }
    }
}

/// Right-pad a timestamp to the full 14 digits with `fill`.
fn widen(timestamp: i64, fill: char) -> String {
    let mut digits = timestamp.to_string();
    while digits.len() < 14 {
        digits.push(fill);
    }
    digits
}

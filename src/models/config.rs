//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Archive endpoints and HTTP client settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Queue and worker pool tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Dedup ledger location and checkpointing
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Admission policy for index listing requests
    #[serde(default)]
    pub listing: ListingConfig,

    /// Admission policy for snapshot content requests
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry policy for creating output directories
    #[serde(default = "defaults::directory_retry")]
    pub directory: RetryPolicy,

    /// Circuit breaker shared by both HTTP pipelines
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.archive.user_agent.trim().is_empty() {
            return Err(AppError::validation("archive.user_agent is empty"));
        }
        if self.archive.timeout_secs == 0 {
            return Err(AppError::validation("archive.timeout_secs must be > 0"));
        }
        for (name, host) in [
            ("archive.index_host", &self.archive.index_host),
            ("archive.archive_host", &self.archive.archive_host),
        ] {
            url::Url::parse(host)
                .map_err(|e| AppError::validation(format!("{name} is not a valid URL: {e}")))?;
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(AppError::validation("pipeline.queue_capacity must be > 0"));
        }
        if self.pipeline.scale_interval_ms == 0 {
            return Err(AppError::validation("pipeline.scale_interval_ms must be > 0"));
        }
        if !(self.pipeline.scale_threshold > 0.0 && self.pipeline.scale_threshold <= 1.0) {
            return Err(AppError::validation(
                "pipeline.scale_threshold must be in (0, 1]",
            ));
        }
        if self.ledger.checkpoint_interval_secs == 0 {
            return Err(AppError::validation(
                "ledger.checkpoint_interval_secs must be > 0",
            ));
        }
        if self.listing.requests_per_second == 0 {
            return Err(AppError::validation(
                "listing.requests_per_second must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            pipeline: PipelineConfig::default(),
            ledger: LedgerConfig::default(),
            listing: ListingConfig::default(),
            fetch: FetchConfig::default(),
            directory: defaults::directory_retry(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Archive endpoints and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Host serving the `/cdx/search/cdx` index API
    #[serde(default = "defaults::archive_host")]
    pub index_host: String,

    /// Host serving `/web/<timestamp>id_/<url>` snapshots
    #[serde(default = "defaults::archive_host")]
    pub archive_host: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            index_host: defaults::archive_host(),
            archive_host: defaults::archive_host(),
        }
    }
}

/// Queue and worker pool tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records buffered between the listing producer and the workers
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    /// Length of one throughput sampling window
    #[serde(default = "defaults::scale_interval")]
    pub scale_interval_ms: u64,

    /// Achieved/target ratio below which another worker is spawned
    #[serde(default = "defaults::scale_threshold")]
    pub scale_threshold: f64,

    /// Scaling stops once this many consecutive windows met the target
    #[serde(default = "defaults::stable_windows")]
    pub stable_windows: u32,
}

impl PipelineConfig {
    pub fn scale_interval(&self) -> Duration {
        Duration::from_millis(self.scale_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::queue_capacity(),
            scale_interval_ms: defaults::scale_interval(),
            scale_threshold: defaults::scale_threshold(),
            stable_windows: defaults::stable_windows(),
        }
    }
}

/// Dedup ledger location and checkpointing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding the ledger's log segments
    #[serde(default = "defaults::ledger_dir")]
    pub dir: PathBuf,

    /// Seconds between background checkpoints
    #[serde(default = "defaults::checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
}

impl LedgerConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: defaults::ledger_dir(),
            checkpoint_interval_secs: defaults::checkpoint_interval(),
        }
    }
}

/// Admission policy for index listing requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "defaults::listing_rate")]
    pub requests_per_second: u32,

    #[serde(default = "defaults::listing_retry")]
    pub retry: RetryPolicy,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            requests_per_second: defaults::listing_rate(),
            retry: defaults::listing_retry(),
        }
    }
}

/// Admission policy for snapshot content requests.
///
/// The request rate itself comes from the download request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "defaults::fetch_retry")]
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry: defaults::fetch_retry(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use crate::resilience::{Backoff, RetryPolicy};

    // Archive defaults
    pub fn user_agent() -> String {
        format!("wayback/{}", env!("CARGO_PKG_VERSION"))
    }
    pub fn timeout() -> u64 {
        100
    }
    pub fn archive_host() -> String {
        "https://web.archive.org".into()
    }

    // Pipeline defaults
    pub fn queue_capacity() -> usize {
        200
    }
    pub fn scale_interval() -> u64 {
        2_000
    }
    pub fn scale_threshold() -> f64 {
        0.9
    }
    pub fn stable_windows() -> u32 {
        5
    }

    // Ledger defaults
    pub fn ledger_dir() -> PathBuf {
        PathBuf::from("./checkpoints")
    }
    pub fn checkpoint_interval() -> u64 {
        30
    }

    // Admission defaults
    pub fn listing_rate() -> u32 {
        1
    }
    pub fn listing_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            delay_ms: 2_000,
            backoff: Backoff::Constant,
            jitter: true,
        }
    }
    pub fn fetch_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            delay_ms: 10_000,
            backoff: Backoff::Linear,
            jitter: true,
        }
    }
    pub fn directory_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            delay_ms: 200,
            backoff: Backoff::Linear,
            jitter: false,
        }
    }
}

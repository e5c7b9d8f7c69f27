// src/resilience/retry.rs

//! Retry policies with constant or linear backoff.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::CancelToken;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry
    Constant,
    /// Delay multiplied by the retry number
    Linear,
}

/// Retry policy for one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay in milliseconds
    pub delay_ms: u64,
    pub backoff: Backoff,
    /// Randomize each delay by up to +/-25%
    #[serde(default)]
    pub jitter: bool,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Constant => self.delay_ms,
            Backoff::Linear => self.delay_ms.saturating_mul(u64::from(retry.max(1))),
        };
        if !self.jitter || base == 0 {
            return Duration::from_millis(base);
        }
        let factor = rand::rng().random_range(0.75..1.25);
        Duration::from_millis((base as f64 * factor) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs out
    /// of retries, or `cancel` fires.
    ///
    /// Returns the last error when giving up.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancelToken,
        is_retryable: impl Fn(&AppError) -> bool,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries && is_retryable(&e) && !cancel.is_cancelled() => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    log::debug!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        retry,
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Create `path` and its parents, retrying IO failures per `policy`.
pub async fn create_dir_with_retry(
    path: &Path,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<()> {
    policy
        .run(
            cancel,
            |e| matches!(e, AppError::Io(_)),
            || async move { tokio::fs::create_dir_all(path).await.map_err(AppError::from) },
        )
        .await
}

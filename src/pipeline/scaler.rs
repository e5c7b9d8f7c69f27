// src/pipeline/scaler.rs

//! Throughput-driven worker pool scaling.
//!
//! The pool starts with one worker once the listing has produced a record.
//! Every sampling window the scaler compares the fetch rate limiter's lease
//! rate with the requested rate and adds a worker while the pool falls short.
//! Workers are never removed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::PipelineConfig;
use crate::pipeline::producer::ListingSignal;
use crate::resilience::ThroughputSource;
use crate::utils::CancelToken;

/// Tuning of the scaling loop.
#[derive(Debug, Clone)]
pub struct ScalerSettings {
    /// Length of one sampling window
    pub interval: Duration,
    /// Achieved/target ratio below which a worker is added
    pub threshold: f64,
    /// Stop once more than this many consecutive windows met the target
    pub stable_windows: u32,
    /// Requested fetch rate in requests per second
    pub target_rate: u32,
}

impl ScalerSettings {
    pub fn new(config: &PipelineConfig, target_rate: u32) -> Self {
        Self {
            interval: config.scale_interval(),
            threshold: config.scale_threshold,
            stable_windows: config.stable_windows,
            target_rate,
        }
    }
}

/// Handles of every worker spawned during a run.
#[derive(Debug, Default)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    fn any_finished(&self) -> bool {
        self.handles.iter().any(JoinHandle::is_finished)
    }

    /// Wait for every worker to finish.
    ///
    /// All workers are joined even if one of them panicked; the first
    /// failure is returned afterwards.
    pub async fn wait_for_completion(self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Worker task failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Grows the worker pool until the requested rate is met.
pub struct PoolScaler {
    settings: ScalerSettings,
    throughput: Arc<dyn ThroughputSource>,
}

impl PoolScaler {
    pub fn new(settings: ScalerSettings, throughput: Arc<dyn ThroughputSource>) -> Self {
        Self {
            settings,
            throughput,
        }
    }

    /// Run the scaling loop, spawning workers with `spawn`.
    ///
    /// Returns once scaling has stopped: the target rate was met for long
    /// enough, a worker finished, or `cancel` fired. Workers spawned so far
    /// keep running; the returned pool is used to wait for them.
    pub async fn supervise<F>(
        &self,
        signal: &mut ListingSignal,
        cancel: &CancelToken,
        mut spawn: F,
    ) -> WorkerPool
    where
        F: FnMut() -> JoinHandle<()>,
    {
        let mut pool = WorkerPool::default();
        let interval = self.settings.interval;

        if !signal.wait_for_first_record(cancel).await {
            log::debug!("Listing produced no records; no workers started");
            return pool;
        }

        pool.push(spawn());
        if !self.sleep(cancel).await {
            return pool;
        }

        // Leases taken while the first worker warmed up belong to no window.
        let mut last_total = self.throughput.total_leases();
        let mut stable = 0u32;

        loop {
            if cancel.is_cancelled() || pool.any_finished() {
                break;
            }
            if !self.sleep(cancel).await {
                break;
            }

            let total = self.throughput.total_leases();
            if total == 0 {
                log::info!(
                    "Could not evaluate if new workers are required to meet requested download speeds as no statistics were available"
                );
                stable += 1;
                continue;
            }

            let in_window = total.saturating_sub(last_total);
            let achieved = in_window as f64 / interval.as_secs_f64();
            let ratio = achieved / f64::from(self.settings.target_rate.max(1));
            log::debug!(
                "Workers: {}, Last Segment: {}, Download Speed: {:.2}/{}",
                pool.len(),
                in_window,
                achieved,
                self.settings.target_rate
            );

            if ratio < self.settings.threshold {
                stable = 0;
                pool.push(spawn());
            } else {
                stable += 1;
            }
            last_total = total;

            if stable > self.settings.stable_windows {
                log::debug!("Requested download speed reached with {} workers", pool.len());
                break;
            }
        }

        pool
    }

    /// Sleep one window. Returns `false` if cancelled first.
    async fn sleep(&self, cancel: &CancelToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.interval) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

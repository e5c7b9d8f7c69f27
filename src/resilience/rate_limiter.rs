// src/resilience/rate_limiter.rs

//! Sliding window rate limiter with lease statistics.
//!
//! A lease is granted when fewer than `permits` leases were granted during the
//! trailing window. Callers that exceed the budget wait until the oldest lease
//! leaves the window. The cumulative lease count is what the worker pool
//! scaler samples to measure throughput.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Read-only view of how many leases a limiter has handed out.
pub trait ThroughputSource: Send + Sync {
    /// Total leases granted since creation.
    fn total_leases(&self) -> u64;
}

/// Sliding window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    permits: usize,
    window: Duration,
    granted: Mutex<VecDeque<Instant>>,
    total: AtomicU64,
}

impl RateLimiter {
    /// Allow `permits` leases per `window`.
    pub fn new(permits: u32, window: Duration) -> Self {
        let permits = permits.max(1) as usize;
        Self {
            permits,
            window,
            granted: Mutex::new(VecDeque::with_capacity(permits)),
            total: AtomicU64::new(0),
        }
    }

    /// Allow `rate` leases per second.
    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    /// Leases allowed per window.
    pub fn permits(&self) -> u32 {
        self.permits as u32
    }

    /// Wait for a lease.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut granted = self.granted.lock().await;
                let now = Instant::now();
                while granted
                    .front()
                    .is_some_and(|&at| now.duration_since(at) >= self.window)
                {
                    granted.pop_front();
                }

                if granted.len() < self.permits {
                    granted.push_back(now);
                    self.total.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                match granted.front() {
                    Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

impl ThroughputSource for RateLimiter {
    fn total_leases(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

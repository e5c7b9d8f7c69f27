// src/resilience/circuit_breaker.rs

//! Failure-ratio circuit breaker for one HTTP pipeline.
//!
//! The breaker tracks the outcomes observed during a sampling window. When at
//! least `minimum_throughput` calls were made and the failed share reaches
//! `failure_ratio`, it opens and rejects calls for `break_secs`. After that a
//! single trial call is let through: success closes the breaker, failure
//! opens it again. Every admitted call holds a [`BreakerPermit`].

use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Share of failed calls (0-1) that opens the breaker
    #[serde(default = "defaults::failure_ratio")]
    pub failure_ratio: f64,

    /// Calls required in a window before the ratio is considered
    #[serde(default = "defaults::minimum_throughput")]
    pub minimum_throughput: u32,

    /// Length of the sampling window in seconds
    #[serde(default = "defaults::sampling_secs")]
    pub sampling_secs: u64,

    /// How long the breaker stays open in seconds
    #[serde(default = "defaults::break_secs")]
    pub break_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: defaults::failure_ratio(),
            minimum_throughput: defaults::minimum_throughput(),
            sampling_secs: defaults::sampling_secs(),
            break_secs: defaults::break_secs(),
        }
    }
}

mod defaults {
    pub fn failure_ratio() -> f64 {
        0.1
    }
    pub fn minimum_throughput() -> u32 {
        100
    }
    pub fn sampling_secs() -> u64 {
        30
    }
    pub fn break_secs() -> u64 {
        5
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls proceed and outcomes are sampled
    Closed,
    /// Calls are rejected until the break elapses
    Open,
    /// One trial call is in flight
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window_start: Instant,
    successes: u32,
    failures: u32,
    opened_at: Option<Instant>,
    /// Start of the trial currently holding the half-open slot
    trial_started: Option<Instant>,
}

impl Inner {
    fn reset_window(&mut self, now: Instant) {
        self.window_start = now;
        self.successes = 0;
        self.failures = 0;
    }
}

/// Breaker shared by every caller of one pipeline.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Admission of one call through the breaker.
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). A trial permit dropped without an outcome
/// frees the half-open slot for the next caller.
#[derive(Debug)]
#[must_use = "a permit must be settled with success() or failure()"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn failure(mut self, reason: &str) {
        self.settled = true;
        self.breaker.record_failure(self.trial, reason);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window_start: Instant::now(),
                successes: 0,
                failures: 0,
                opened_at: None,
                trial_started: None,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admit a call, or `None` while the breaker rejects calls.
    ///
    /// A trial that has not reported back within `break_secs` is considered
    /// lost and its slot is handed to the next caller.
    pub fn permit(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.lock();
        let now = Instant::now();
        let break_duration = Duration::from_secs(self.config.break_secs);

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| now.duration_since(at))
                    .unwrap_or_default();
                if elapsed < break_duration {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                info!("Circuit breaker HALF-OPEN for the {} pipeline", self.name);
                true
            }
            CircuitState::HalfOpen => {
                let busy = inner
                    .trial_started
                    .is_some_and(|at| now.duration_since(at) < break_duration);
                if busy {
                    return None;
                }
                true
            }
        };

        if trial {
            inner.trial_started = Some(now);
        }
        Some(BreakerPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.trial_started = None;
                inner.opened_at = None;
                inner.reset_window(now);
                info!("Circuit breaker CLOSED for the {} pipeline", self.name);
            }
            CircuitState::Closed => {
                self.roll_window(&mut inner, now);
                inner.successes += 1;
            }
            _ => {}
        }
    }

    fn record_failure(&self, trial: bool, reason: &str) {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::HalfOpen if trial => {
                self.open(&mut inner, now, reason);
            }
            CircuitState::Closed => {
                self.roll_window(&mut inner, now);
                inner.failures += 1;
                let total = inner.successes + inner.failures;
                let ratio = f64::from(inner.failures) / f64::from(total);
                if total >= self.config.minimum_throughput && ratio >= self.config.failure_ratio {
                    self.open(&mut inner, now, reason);
                }
            }
            _ => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_started = None;
            log::debug!(
                "Trial for the {} pipeline ended without an outcome; slot released",
                self.name
            );
        }
    }

    fn roll_window(&self, inner: &mut Inner, now: Instant) {
        if now.duration_since(inner.window_start) >= Duration::from_secs(self.config.sampling_secs) {
            inner.reset_window(now);
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant, reason: &str) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.trial_started = None;
        inner.reset_window(now);
        warn!(
            "Circuit breaker OPEN for the {} pipeline for {}s. Last error: {}",
            self.name, self.config.break_secs, reason
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(minimum_throughput: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_ratio: 0.5,
                minimum_throughput,
                sampling_secs: 30,
                break_secs: 5,
            },
        )
    }

    fn fail(breaker: &CircuitBreaker) {
        if let Some(permit) = breaker.permit() {
            permit.failure("boom");
        }
    }

    fn succeed(breaker: &CircuitBreaker) {
        if let Some(permit) = breaker.permit() {
            permit.success();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stays_closed_below_minimum_throughput() {
        let breaker = breaker(10);
        for _ in 0..9 {
            fail(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.permit().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_when_failure_ratio_reached() {
        let breaker = breaker(4);
        succeed(&breaker);
        succeed(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.permit().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_trial_closes_on_success() {
        let breaker = breaker(1);
        fail(&breaker);
        assert!(breaker.permit().is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = breaker.permit().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Only one trial at a time.
        assert!(breaker.permit().is_none());

        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_trial_reopens_on_failure() {
        let breaker = breaker(1);
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;
        breaker.permit().unwrap().failure("still down");
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.permit().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_frees_the_slot() {
        let breaker = breaker(1);
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;

        drop(breaker.permit().unwrap());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let next = breaker.permit().unwrap();
        assert!(next.is_trial());
        next.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_trial_expires_after_break() {
        let breaker = breaker(1);
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;

        let lost = breaker.permit().unwrap();
        std::mem::forget(lost);
        assert!(breaker.permit().is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        breaker.permit().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_outcome_of_earlier_call_does_not_settle_trial() {
        let breaker = breaker(1);
        let earlier = breaker.permit().unwrap();
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = breaker.permit().unwrap();

        earlier.success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_window_forgets_old_failures() {
        let breaker = breaker(3);
        fail(&breaker);
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

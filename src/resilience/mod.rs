// src/resilience/mod.rs

//! Admission control for outbound requests and local retries.
//!
//! - `rate_limiter`: sliding window request budget
//! - `retry`: constant/linear backoff policies
//! - `circuit_breaker`: failure-ratio breaker
//! - `client`: the three combined around a [`Transport`](crate::utils::Transport)

pub mod circuit_breaker;
pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{ResilientClient, is_transient_status};
pub use rate_limiter::{RateLimiter, ThroughputSource};
pub use retry::{Backoff, RetryPolicy, create_dir_with_retry};

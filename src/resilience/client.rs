// src/resilience/client.rs

//! HTTP client wrapped in the admission policy of one pipeline.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RetryPolicy};
use crate::utils::{CancelToken, HttpResponse, Transport};

/// Whether a response status is worth retrying.
pub fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Transport guarded by a rate limiter, a retry policy and a circuit breaker.
///
/// Each logical request takes exactly one rate limiter lease. Every attempt,
/// including retries, passes through the circuit breaker.
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientClient {
    pub fn new(
        pipeline: &'static str,
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            breaker: CircuitBreaker::new(pipeline, breaker),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// GET `url` under this pipeline's admission policy.
    ///
    /// Transient failures that outlive the retry budget are returned as
    /// errors; other non-2xx responses are returned to the caller as-is.
    pub async fn get(&self, url: &str, cancel: &CancelToken) -> Result<HttpResponse> {
        tokio::select! {
            _ = self.limiter.acquire() => {}
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
        }

        self.retry
            .run(cancel, AppError::is_transient, move || self.attempt(url))
            .await
    }

    async fn attempt(&self, url: &str) -> Result<HttpResponse> {
        let Some(permit) = self.breaker.permit() else {
            return Err(AppError::CircuitOpen {
                pipeline: self.breaker.name(),
            });
        };

        match self.transport.get(url).await {
            Ok(response) if is_transient_status(response.status()) => {
                let message = format!("HTTP {}", response.status());
                permit.failure(&message);
                Err(AppError::transport(url, message))
            }
            Ok(response) => {
                permit.success();
                Ok(response)
            }
            // Any error answering the half-open trial keeps the pipeline broken.
            Err(e) => {
                if e.is_transient() || permit.is_trial() {
                    permit.failure(&e.to_string());
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::resilience::{Backoff, CircuitState, ThroughputSource};

    enum Step {
        Status(u16),
        Hang,
        Reject,
    }

    /// Replays a fixed list of steps, then answers 200.
    struct Scripted {
        steps: Mutex<Vec<Step>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(statuses: Vec<u16>) -> Self {
            Self::steps(statuses.into_iter().map(Step::Status).collect())
        }

        fn steps(mut steps: Vec<Step>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, _url: &str) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop().unwrap_or(Step::Status(200));
            match step {
                Step::Status(status) => Ok(HttpResponse::from_bytes(status, "body")),
                Step::Hang => std::future::pending().await,
                Step::Reject => Err(AppError::validation("rejected")),
            }
        }
    }

    fn client(transport: Arc<Scripted>, max_retries: u32) -> ResilientClient {
        client_with(transport, max_retries, CircuitBreakerConfig::default())
    }

    fn client_with(
        transport: Arc<Scripted>,
        max_retries: u32,
        breaker: CircuitBreakerConfig,
    ) -> ResilientClient {
        ResilientClient::new(
            "test",
            transport,
            Arc::new(RateLimiter::per_second(10)),
            RetryPolicy {
                max_retries,
                delay_ms: 10,
                backoff: Backoff::Constant,
                jitter: false,
            },
            breaker,
        )
    }

    /// Opens on the first failure and stays open for five seconds.
    fn hair_trigger() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_ratio: 0.5,
            minimum_throughput: 1,
            sampling_secs: 30,
            break_secs: 5,
        }
    }

    #[test]
    fn classifies_transient_statuses() {
        assert!(is_transient_status(503));
        assert!(is_transient_status(408));
        assert!(is_transient_status(429));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(200));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_server_errors_with_a_single_lease() {
        let transport = Arc::new(Scripted::new(vec![503, 408]));
        let client = client(transport.clone(), 5);

        let response = client.get("http://a", &CancelToken::new()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.limiter().total_leases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_permanent_failures_without_retry() {
        let transport = Arc::new(Scripted::new(vec![404]));
        let client = client(transport.clone(), 5);

        let response = client.get("http://a", &CancelToken::new()).await.unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_as_error() {
        let transport = Arc::new(Scripted::new(vec![500, 500, 500]));
        let client = client(transport.clone(), 2);

        let result = client.get("http://a", &CancelToken::new()).await;
        assert!(matches!(result, Err(AppError::Transport { .. })));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_lease_wait() {
        let transport = Arc::new(Scripted::new(vec![]));
        let client = client(transport.clone(), 0);
        for _ in 0..10 {
            client.limiter().acquire().await;
        }
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = client.get("http://a", &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_half_open_call_lets_the_next_call_through() {
        let transport = Arc::new(Scripted::steps(vec![Step::Status(503), Step::Hang]));
        let client = Arc::new(client_with(transport.clone(), 0, hair_trigger()));

        assert!(client.get("http://a", &CancelToken::new()).await.is_err());
        assert_eq!(client.breaker().state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(5)).await;

        let stuck = {
            let client = client.clone();
            tokio::spawn(async move { client.get("http://a", &CancelToken::new()).await })
        };
        while transport.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(client.breaker().state(), CircuitState::HalfOpen);
        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());

        let response = client.get("http://a", &CancelToken::new()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_in_half_open_reopens() {
        let transport = Arc::new(Scripted::steps(vec![Step::Status(503), Step::Reject]));
        let client = client_with(transport.clone(), 0, hair_trigger());
        let cancel = CancelToken::new();

        assert!(client.get("http://a", &cancel).await.is_err());
        tokio::time::advance(Duration::from_secs(5)).await;

        let result = client.get("http://a", &cancel).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(client.breaker().state(), CircuitState::Open);
        assert!(matches!(
            client.get("http://a", &cancel).await,
            Err(AppError::CircuitOpen { .. })
        ));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(client.get("http://a", &cancel).await.unwrap().status(), 200);
        assert_eq!(client.breaker().state(), CircuitState::Closed);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_while_closed_is_not_counted() {
        let transport = Arc::new(Scripted::steps(vec![Step::Reject]));
        let client = client_with(transport, 0, hair_trigger());

        let result = client.get("http://a", &CancelToken::new()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }
}

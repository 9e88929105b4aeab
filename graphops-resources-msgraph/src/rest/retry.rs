use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{HttpRequest, HttpResponse, Transport, TransportError};

/// When and how long to wait before repeating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub initial_wait: Duration,
    /// Caps both the backoff and a server's `Retry-After` hint.
    pub max_wait: Duration,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 30,
            initial_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
            retry_on_status: vec![
                429, // Too Many Requests
                500, // Internal Server Error
                503, // Service Unavailable
                504, // Gateway Timeout
            ],
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// The wait before retry number `attempt`, counting from 0.
    ///
    /// Doubles from `initial_wait` up to `max_wait`; a `Retry-After` hint
    /// replaces the backoff but is capped the same way.
    pub fn wait(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_wait),
            None => self
                .initial_wait
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(self.max_wait),
        }
    }
}

/// Wraps a transport and repeats requests that fail with a retryable status.
///
/// The last response is returned as-is once the budget is spent. Transport
/// failures are not retried. Cancellation interrupts a pending wait.
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let response = self.inner.send(request, cancel).await?;
            if !self.policy.is_retryable(response.status) || attempt >= self.policy.max_retries {
                return Ok(response);
            }

            let wait = self.policy.wait(attempt, response.retry_after);
            attempt += 1;
            warn!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "retrying request"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{fake::ScriptedTransport, Method};
    use tokio::time::Instant;

    fn get() -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            path: "v1.0/groups/X1".to_string(),
            body: None,
        }
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 30);
        for status in [429, 500, 503, 504] {
            assert!(policy.is_retryable(status));
        }
        for status in [200, 400, 404, 502] {
            assert!(!policy.is_retryable(status));
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait(0, None), Duration::from_secs(1));
        assert_eq!(policy.wait(1, None), Duration::from_secs(2));
        assert_eq!(policy.wait(4, None), Duration::from_secs(16));
        assert_eq!(policy.wait(5, None), Duration::from_secs(30));
        assert_eq!(policy.wait(31, None), Duration::from_secs(30));
        assert_eq!(policy.wait(0, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(policy.wait(0, Some(Duration::from_secs(600))), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_throttled_request() {
        let fake = ScriptedTransport::new([
            Ok(HttpResponse::new(429, "slow down")),
            Ok(HttpResponse::new(200, r#"{"id":"X1"}"#)),
        ]);
        let transport = RetryTransport::new(fake.clone(), RetryPolicy::default());

        let start = Instant::now();
        let response = transport
            .send(&get(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(fake.requests().len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn honours_retry_after() {
        let mut throttled = HttpResponse::new(503, "");
        throttled.retry_after = Some(Duration::from_secs(5));
        let fake = ScriptedTransport::new([Ok(throttled), Ok(HttpResponse::new(204, ""))]);
        let transport = RetryTransport::new(fake, RetryPolicy::default());

        let start = Instant::now();
        let response = transport
            .send(&get(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_returns_immediately() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(400, "bad"))]);
        let transport = RetryTransport::new(fake.clone(), RetryPolicy::default());
        let response = transport
            .send(&get(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_response() {
        let fake = ScriptedTransport::new([
            Ok(HttpResponse::new(500, "one")),
            Ok(HttpResponse::new(504, "two")),
            Ok(HttpResponse::new(503, "three")),
        ]);
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        let transport = RetryTransport::new(fake.clone(), policy);

        let start = Instant::now();
        let response = transport
            .send(&get(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"three");
        assert_eq!(fake.requests().len(), 3);
        // 1s + 2s
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_not_retried() {
        let fake = ScriptedTransport::new([Err("connection reset".to_string())]);
        let transport = RetryTransport::new(fake.clone(), RetryPolicy::default());
        let err = transport
            .send(&get(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Failed(m) if m == "connection reset"));
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(429, ""))]);
        let transport = RetryTransport::new(fake.clone(), RetryPolicy::default());
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            })
        };

        let err = transport.send(&get(), &cancel).await.unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, TransportError::Cancelled));
        assert_eq!(fake.requests().len(), 1);
    }
}

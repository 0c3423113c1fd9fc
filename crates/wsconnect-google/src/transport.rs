//! HTTP transport with transport-level retry.
//!
//! The Google API surface used here performs no retry of its own, so a TCP
//! connection dropped mid-request would otherwise fail the whole sync.
//! [`RetryingTransport`] sits between every API client and the raw
//! [`HttpTransport`] and retries only failures that [`is_transient`] accepts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::transient::is_transient;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A failed HTTP round-trip: no response was received.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    temporary: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            temporary: false,
            source: None,
        }
    }

    /// Marks the failure as temporary, as the networking layer does for
    /// timeouts.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timeout"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_body() || err.is_decode() {
            "failed to read response body"
        } else {
            "request failed"
        };
        let mut transport = Self::new(message).with_source(err.without_url());
        if message == "request timeout" {
            transport = transport.temporary();
        }
        transport
    }
}

/// A single HTTP round-trip.
///
/// Implementations must not retry; that is [`RetryingTransport`]'s job.
pub trait HttpTransport: Send + Sync {
    fn execute(
        &self,
        request: reqwest::Request,
    ) -> BoxFuture<'_, Result<reqwest::Response, TransportError>>;
}

/// The production transport, backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::new("failed to create HTTP client").with_source(e))?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(
        &self,
        request: reqwest::Request,
    ) -> BoxFuture<'_, Result<reqwest::Response, TransportError>> {
        Box::pin(async move {
            self.client
                .execute(request)
                .await
                .map_err(TransportError::from)
        })
    }
}

/// Backoff schedule for transport retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed):
    /// `base * 2^attempt` plus uniform jitter of up to half that.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ceiling = u64::try_from(exponential.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ceiling)
        };
        exponential.saturating_add(Duration::from_millis(jitter))
    }
}

/// Wraps an [`HttpTransport`] with bounded exponential backoff.
///
/// A request is retried only when all of these hold: the failure is
/// transient, the retry budget is not spent, the cancellation token has not
/// fired, and the body can be replayed (`reqwest::Request::try_clone`).
pub struct RetryingTransport {
    inner: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn HttpTransport>) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Sends `request`, retrying transient transport failures.
    ///
    /// Any response, including API error statuses, is returned as-is.
    pub async fn send(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, RequestError> {
        let mut request = request;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RequestError::Cancelled);
            }

            let replay = request.try_clone();
            let method = request.method().clone();
            let path = request.url().path().to_string();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                outcome = self.inner.execute(request) => outcome,
            };

            let err = match outcome {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !is_transient(&err) || attempt >= self.policy.max_retries {
                return Err(err.into());
            }
            let Some(next) = replay else {
                debug!(%method, %path, "request body is not replayable, not retrying");
                return Err(err.into());
            };

            let delay = self.policy.backoff(attempt);
            warn!(
                %method,
                %path,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient transport failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
            request = next;
        }
    }
}

//! Error types for sync operations.
//!
//! Two layers:
//!
//! - [`RequestError`] is what a single API call produces: an API error
//!   response, a transport failure, a decode failure, cancellation, or a
//!   credential failure. It is internal plumbing.
//! - [`SyncError`] is what callers see: one of a fixed set of
//!   [`ErrorKind`]s, a context-prefixed message, and rate-limit detail when
//!   the provider sent any. [`crate::classify`] turns the former into the
//!   latter.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::transport::TransportError;

/// The category of a classified sync error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was malformed (400), or local input such as a cursor was.
    InvalidArgument,
    /// Credentials are missing, invalid or expired (401).
    Unauthenticated,
    /// The caller lacks permission (403).
    PermissionDenied,
    /// The resource does not exist (404, 410).
    NotFound,
    /// The request timed out server-side (408).
    DeadlineExceeded,
    /// Conflict with a concurrent change (409).
    Aborted,
    /// A precondition failed (412).
    FailedPrecondition,
    /// Temporarily unavailable: 429, 5xx, or transport failures past the
    /// retry budget.
    Unavailable,
    /// The provider does not implement the operation (501).
    Unimplemented,
    /// Anything else, including unexpected success statuses.
    Unknown,
}

impl ErrorKind {
    /// Returns true if the host should retry the call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Aborted => "aborted",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unavailable => "unavailable",
            Self::Unimplemented => "unimplemented",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rate-limit information parsed from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitDetail {
    /// Requests allowed in the current window.
    pub limit: Option<u64>,
    /// Requests left in the current window.
    pub remaining: Option<u64>,
    /// When the window resets.
    pub reset_at: Option<DateTime<Utc>>,
    /// Delay requested by `Retry-After`.
    pub retry_after: Option<Duration>,
}

impl RateLimitDetail {
    /// Returns true if no header carried any information.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_at.is_none()
            && self.retry_after.is_none()
    }

    /// How long to wait before retrying, relative to `now`.
    ///
    /// `Retry-After` wins over the reset time.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        if let Some(delay) = self.retry_after {
            return Some(delay);
        }
        self.reset_at
            .and_then(|reset| (reset - now).to_std().ok())
    }
}

/// A classified error surfaced to callers of the sync layer.
#[derive(Debug, Error)]
pub struct SyncError {
    code: ErrorKind,
    message: String,
    rate_limit: Option<RateLimitDetail>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SyncError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            rate_limit: None,
            source: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Attaches rate-limit detail.
    pub fn with_rate_limit(mut self, detail: RateLimitDetail) -> Self {
        self.rate_limit = Some(detail);
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorKind {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn rate_limit(&self) -> Option<&RateLimitDetail> {
        self.rate_limit.as_ref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// The provider's own delay hint, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.rate_limit
            .as_ref()
            .and_then(|detail| detail.delay_from(Utc::now()))
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A well-formed error response from a Google API.
#[derive(Debug, Clone, Error)]
#[error("googleapi: Error {status}: {message}")]
pub struct ApiErrorResponse {
    pub status: u16,
    pub message: String,
    /// First `errors[].reason`, e.g. `rateLimitExceeded`.
    pub reason: Option<String>,
    pub rate_limit: Option<RateLimitDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

impl ApiErrorResponse {
    /// Builds an error from a non-success status and its body.
    ///
    /// Google wraps errors as `{"error": {"code", "message", "errors"}}`;
    /// bodies in any other shape are kept verbatim as the message.
    pub fn from_body(status: u16, body: &str) -> Self {
        let (message, reason) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let reason = envelope
                    .error
                    .errors
                    .into_iter()
                    .find_map(|item| item.reason);
                (envelope.error.message, reason)
            }
            Err(_) => (body.trim().to_string(), None),
        };

        Self {
            status,
            message,
            reason,
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, detail: Option<RateLimitDetail>) -> Self {
        self.rate_limit = detail;
        self
    }
}

/// The raw outcome of a failed API call, before classification.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Api(#[from] ApiErrorResponse),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::InvalidArgument.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn sync_error_display() {
        let err = SyncError::new(ErrorKind::PermissionDenied, "listing activities: Not Authorized");
        assert_eq!(
            err.to_string(),
            "permission_denied: listing activities: Not Authorized"
        );
        assert_eq!(err.code(), ErrorKind::PermissionDenied);
        assert!(err.rate_limit().is_none());
    }

    #[test]
    fn retry_after_prefers_header_delay() {
        let now = Utc::now();
        let detail = RateLimitDetail {
            retry_after: Some(Duration::from_secs(7)),
            reset_at: Some(now + chrono::Duration::seconds(60)),
            ..Default::default()
        };
        assert_eq!(detail.delay_from(now), Some(Duration::from_secs(7)));

        let err = SyncError::unavailable("quota").with_rate_limit(detail);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn reset_in_the_past_gives_no_delay() {
        let now = Utc::now();
        let detail = RateLimitDetail {
            reset_at: Some(now - chrono::Duration::seconds(5)),
            ..Default::default()
        };
        assert_eq!(detail.delay_from(now), None);
        assert!(!detail.is_empty());
        assert!(RateLimitDetail::default().is_empty());
    }

    #[test]
    fn api_error_from_google_body() {
        let body = r#"{
            "error": {
                "code": 403,
                "message": "Not Authorized to access this resource/api",
                "errors": [{"reason": "forbidden", "domain": "global"}]
            }
        }"#;
        let err = ApiErrorResponse::from_body(403, body);
        assert_eq!(err.status, 403);
        assert_eq!(err.message, "Not Authorized to access this resource/api");
        assert_eq!(err.reason.as_deref(), Some("forbidden"));
        assert_eq!(
            err.to_string(),
            "googleapi: Error 403: Not Authorized to access this resource/api"
        );
    }

    #[test]
    fn api_error_from_plain_body() {
        let err = ApiErrorResponse::from_body(502, "  Bad Gateway\n");
        assert_eq!(err.message, "Bad Gateway");
        assert!(err.reason.is_none());
    }
}

//! Mapping of failed API calls onto [`ErrorKind`]s.
//!
//! The context message is always placed before the provider's message,
//! never after: host tooling matches on the message prefix.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::auth::AuthError;
use crate::error::{ErrorKind, RateLimitDetail, RequestError, SyncError};

const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Reset values below this are deltas in seconds, above it epoch seconds.
const RESET_EPOCH_THRESHOLD: i64 = 1_000_000_000;

/// Maps an HTTP status to an error kind.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::InvalidArgument,
        401 => ErrorKind::Unauthenticated,
        403 => ErrorKind::PermissionDenied,
        404 | 410 => ErrorKind::NotFound,
        408 => ErrorKind::DeadlineExceeded,
        409 => ErrorKind::Aborted,
        412 => ErrorKind::FailedPrecondition,
        429 => ErrorKind::Unavailable,
        501 => ErrorKind::Unimplemented,
        500..=599 => ErrorKind::Unavailable,
        _ => ErrorKind::Unknown,
    }
}

/// Classifies a failed request, prefixing `context` to the message.
///
/// Failures that never produced an API response (transport faults past the
/// retry budget, undecodable bodies, cancellation) become
/// [`ErrorKind::Unavailable`] so the host retries the call later.
pub fn classify(err: RequestError, context: &str) -> SyncError {
    match err {
        RequestError::Api(api) => {
            let kind = classify_status(api.status);
            let detail = match api.status {
                200..=299 => format!(
                    "unexpected success status {} reported as an error: {}",
                    api.status, api.message
                ),
                _ if kind == ErrorKind::Unknown => {
                    format!("unexpected status code {}: {}", api.status, api.message)
                }
                _ => api.message.clone(),
            };
            let rate_limit = api.rate_limit.clone();
            let mut classified = SyncError::new(kind, prefix(context, &detail)).with_source(api);
            if let Some(rate_limit) = rate_limit {
                classified = classified.with_rate_limit(rate_limit);
            }
            classified
        }
        RequestError::Auth(auth) => classify_auth(auth, context),
        other => SyncError::unavailable(prefix(context, &other.to_string())).with_source(other),
    }
}

fn classify_auth(err: AuthError, context: &str) -> SyncError {
    let kind = match &err {
        AuthError::Unauthorized { .. } => ErrorKind::Unauthenticated,
        AuthError::Rejected { status, .. } => classify_status(*status),
        AuthError::InvalidKey(_) => ErrorKind::InvalidArgument,
        AuthError::Request(_) => ErrorKind::Unavailable,
    };
    SyncError::new(kind, prefix(context, &err.to_string())).with_source(err)
}

fn prefix(context: &str, message: &str) -> String {
    if context.is_empty() {
        message.to_string()
    } else {
        format!("{context}: {message}")
    }
}

/// Parses rate-limit headers, returning `None` when none are present.
pub fn rate_limit_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<RateLimitDetail> {
    let detail = RateLimitDetail {
        limit: header_u64(headers, RATE_LIMIT_LIMIT),
        remaining: header_u64(headers, RATE_LIMIT_REMAINING),
        reset_at: header_str(headers, RATE_LIMIT_RESET).and_then(|v| parse_reset(v, now)),
        retry_after: header_str(headers, RETRY_AFTER.as_str())
            .and_then(|v| parse_retry_after(v, now)),
    };

    if detail.is_empty() { None } else { Some(detail) }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.parse().ok())
}

fn parse_reset(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs: i64 = value.parse().ok()?;
    if secs >= RESET_EPOCH_THRESHOLD {
        DateTime::from_timestamp(secs, 0)
    } else {
        Some(now + chrono::Duration::seconds(secs))
    }
}

/// `Retry-After` is either delta-seconds or an HTTP date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

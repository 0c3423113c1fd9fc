//! Timestamp handling for activity records.
//!
//! The Reports API documents `id.time` as RFC3339, but a single malformed
//! record must never reject a whole page, so parsing degrades to epoch
//! seconds and finally to the Unix epoch itself.

use chrono::{DateTime, Utc};
use tracing::warn;

/// The Unix epoch, used when an activity time cannot be parsed at all.
pub const UNIX_ZERO: DateTime<Utc> = DateTime::UNIX_EPOCH;

/// Parses an activity timestamp.
///
/// Tries RFC3339 first, then Unix epoch seconds, and falls back to
/// [`UNIX_ZERO`].
pub fn parse_activity_time(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }

    if let Some(parsed) = raw
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        return parsed;
    }

    warn!(value = %raw, "unparseable activity time, using unix epoch");
    UNIX_ZERO
}

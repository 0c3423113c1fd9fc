//! The opaque resume point handed back to the host.
//!
//! A cursor walks the activity log in windows. A window opens at `start_at`
//! and is read page by page through the provider's continuation token; the
//! latest activity time seen is tracked along the way. Once a page comes back
//! without a continuation token the window closes: the next one starts at the
//! latest time seen. Activities at exactly that instant are read twice, which
//! the host tolerates.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCursor {
    /// Latest activity time observed in the current window.
    #[serde(default, with = "rfc3339_or_empty")]
    pub latest_event_seen: Option<DateTime<Utc>>,
    /// Provider continuation token, empty once the window is exhausted.
    #[serde(default)]
    pub next_page_token: String,
    /// Start of the current (or next) window.
    #[serde(default, with = "rfc3339_or_empty")]
    pub start_at: Option<DateTime<Utc>>,
    /// Page size requested when the window opened.
    #[serde(default)]
    pub page_size: u32,
}

impl EventCursor {
    /// Decodes a token produced by [`EventCursor::encode`].
    ///
    /// The empty token is the initial cursor.
    pub fn decode(token: &str) -> SyncResult<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(Self::default());
        }

        let bytes = STANDARD
            .decode(token)
            .map_err(|e| SyncError::invalid_argument(format!("malformed cursor: {e}")).with_source(e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::invalid_argument(format!("malformed cursor: {e}")).with_source(e))
    }

    pub fn encode(&self) -> SyncResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| SyncError::unknown(format!("failed to encode cursor: {e}")).with_source(e))?;
        Ok(STANDARD.encode(json))
    }

    /// Returns true while a continuation token is pending.
    pub fn is_mid_window(&self) -> bool {
        !self.next_page_token.is_empty()
    }

    /// Prepares the cursor for a page fetch.
    ///
    /// A window without a start begins at `default_start`, and the latest
    /// time seen never starts out earlier than the window itself.
    pub fn open_window(&mut self, default_start: DateTime<Utc>) {
        let start = *self.start_at.get_or_insert(default_start);
        if self.latest_event_seen.is_none() {
            self.latest_event_seen = Some(start);
        }
    }

    /// Records an activity time.
    pub fn observe(&mut self, occurred_at: DateTime<Utc>) {
        self.latest_event_seen = Some(match self.latest_event_seen {
            Some(latest) => latest.max(occurred_at),
            None => occurred_at,
        });
    }

    /// Moves past a fetched page.
    ///
    /// With a continuation token the window stays open. Without one it
    /// closes, and `start_at` moves forward to the latest time seen.
    pub fn advance(&mut self, next_page_token: Option<String>) {
        match next_page_token.filter(|token| !token.is_empty()) {
            Some(token) => self.next_page_token = token,
            None => {
                self.next_page_token.clear();
                if let Some(latest) = self.latest_event_seen.take() {
                    self.start_at = Some(match self.start_at {
                        Some(start) => start.max(latest),
                        None => latest,
                    });
                }
            }
        }
    }
}

/// Timestamps as RFC3339 strings, with `""` standing for none.
mod rfc3339_or_empty {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn empty_token_is_initial_cursor() {
        let cursor = EventCursor::decode("").unwrap();
        assert_eq!(cursor, EventCursor::default());
        assert!(!cursor.is_mid_window());
    }

    #[test]
    fn encoded_shape_is_stable() {
        let cursor = EventCursor {
            latest_event_seen: Some(at(10, 5)),
            next_page_token: "tok".to_string(),
            start_at: Some(at(10, 0)),
            page_size: 50,
        };
        let token = cursor.encode().unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(&token).unwrap()).unwrap();

        insta::assert_json_snapshot!(json, @r#"
        {
          "latest_event_seen": "2024-03-15T10:05:00Z",
          "next_page_token": "tok",
          "page_size": 50,
          "start_at": "2024-03-15T10:00:00Z"
        }
        "#);
        assert_eq!(EventCursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn empty_timestamps_decode_as_none() {
        let json = r#"{"latest_event_seen":"","next_page_token":"","start_at":"2024-03-15T10:00:00Z","page_size":0}"#;
        let cursor = EventCursor::decode(&STANDARD.encode(json)).unwrap();
        assert_eq!(cursor.latest_event_seen, None);
        assert_eq!(cursor.start_at, Some(at(10, 0)));
    }

    #[test]
    fn malformed_token_is_invalid_argument() {
        let err = EventCursor::decode("%%% not base64").unwrap_err();
        assert_eq!(err.code(), ErrorKind::InvalidArgument);

        let err = EventCursor::decode(&STANDARD.encode("{not json")).unwrap_err();
        assert_eq!(err.code(), ErrorKind::InvalidArgument);
        assert!(err.message().starts_with("malformed cursor"));
    }

    #[test]
    fn open_window_seeds_start_and_latest() {
        let mut cursor = EventCursor::default();
        cursor.open_window(at(9, 0));
        assert_eq!(cursor.start_at, Some(at(9, 0)));
        assert_eq!(cursor.latest_event_seen, Some(at(9, 0)));

        // An existing start wins over the default.
        let mut cursor = EventCursor {
            start_at: Some(at(8, 0)),
            ..Default::default()
        };
        cursor.open_window(at(9, 0));
        assert_eq!(cursor.start_at, Some(at(8, 0)));
    }

    #[test]
    fn observe_keeps_maximum() {
        let mut cursor = EventCursor::default();
        cursor.open_window(at(9, 0));
        cursor.observe(at(9, 30));
        cursor.observe(at(9, 10));
        assert_eq!(cursor.latest_event_seen, Some(at(9, 30)));
    }

    #[test]
    fn continuation_keeps_window_open() {
        let mut cursor = EventCursor::default();
        cursor.open_window(at(9, 0));
        cursor.observe(at(9, 30));
        cursor.advance(Some("page-2".to_string()));

        assert!(cursor.is_mid_window());
        assert_eq!(cursor.start_at, Some(at(9, 0)));
        assert_eq!(cursor.latest_event_seen, Some(at(9, 30)));
    }

    #[test]
    fn exhausted_page_closes_window() {
        let mut cursor = EventCursor {
            next_page_token: "page-2".to_string(),
            ..Default::default()
        };
        cursor.open_window(at(9, 0));
        cursor.observe(at(9, 45));
        let previous_latest = cursor.latest_event_seen;

        cursor.advance(Some(String::new()));

        assert!(!cursor.is_mid_window());
        assert_eq!(cursor.start_at, previous_latest);
        assert_eq!(cursor.latest_event_seen, None);
    }

    #[test]
    fn start_never_regresses_across_windows() {
        let mut cursor = EventCursor::default();
        let mut previous_start = None;
        let observations = [
            vec![at(9, 5), at(9, 1)],
            vec![],
            vec![at(9, 2)],
            vec![at(11, 0), at(10, 0)],
        ];

        for page in observations {
            cursor.open_window(at(9, 0));
            for occurred_at in page {
                cursor.observe(occurred_at);
            }
            let latest = cursor.latest_event_seen;
            cursor.advance(None);

            assert_eq!(cursor.latest_event_seen, None);
            assert!(cursor.start_at >= previous_start);
            assert_eq!(cursor.start_at, latest);
            previous_start = cursor.start_at;
        }
        assert_eq!(cursor.start_at, Some(at(11, 0)));
    }
}

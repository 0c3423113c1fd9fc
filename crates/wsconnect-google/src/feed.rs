//! Incremental polling of the activity log.
//!
//! Each [`EventFeed::poll`] fetches exactly one page, interprets it, and hands
//! back the events with an advanced cursor. A failed fetch leaves the
//! caller's cursor untouched, so retrying the same call is always safe.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wsconnect_core::NormalizedEvent;

use crate::activity::{
    ADMIN_APPLICATION, AUTHORIZE_EVENT, Activity, ActivityPage, ActivityQuery, TOKEN_APPLICATION,
    interpret_admin, interpret_usage,
};
use crate::classify::classify;
use crate::cursor::EventCursor;
use crate::error::{RequestError, SyncError, SyncResult};
use crate::resolver::ResourceIdResolver;
use crate::services::{ServiceCache, scopes};
use crate::transport::BoxFuture;

/// Page size used when the caller asks for none.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest page the Reports API serves.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Which activity log a feed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Directory changes from the admin console audit log.
    Admin,
    /// App authorizations from the token audit log.
    Usage,
}

impl FeedKind {
    pub fn application(&self) -> &'static str {
        match self {
            Self::Admin => ADMIN_APPLICATION,
            Self::Usage => TOKEN_APPLICATION,
        }
    }

    fn event_name(&self) -> Option<&'static str> {
        match self {
            Self::Admin => None,
            Self::Usage => Some(AUTHORIZE_EVENT),
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admin => "admin",
            Self::Usage => "usage",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Sent as `customerId` when set.
    pub customer_id: Option<String>,
    /// How far back a cursor-less poll starts.
    pub lag_window: TimeDelta,
    pub default_page_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            customer_id: None,
            lag_window: TimeDelta::hours(1),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Fetches pages of the activity log.
pub trait ActivitySource: Send + Sync {
    fn list_activities<'a>(
        &'a self,
        query: &'a ActivityQuery,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ActivityPage, RequestError>>;
}

/// Reads the activity log through the scoped client cache.
pub struct ServiceActivitySource {
    services: Arc<ServiceCache>,
}

impl ServiceActivitySource {
    pub fn new(services: Arc<ServiceCache>) -> Self {
        Self { services }
    }
}

impl ActivitySource for ServiceActivitySource {
    fn list_activities<'a>(
        &'a self,
        query: &'a ActivityQuery,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ActivityPage, RequestError>> {
        Box::pin(async move {
            let client = self
                .services
                .get(scopes::REPORTS_AUDIT_READONLY, cancel)
                .await?;
            client.list_activities(query, cancel).await
        })
    }
}

/// The outcome of one poll.
#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub events: Vec<NormalizedEvent>,
    /// Opaque cursor to pass to the next poll.
    pub cursor: String,
    /// True while the current window has more pages.
    pub has_more: bool,
}

pub struct EventFeed {
    kind: FeedKind,
    source: Arc<dyn ActivitySource>,
    resolver: Arc<ResourceIdResolver>,
    config: FeedConfig,
}

impl EventFeed {
    pub fn new(
        kind: FeedKind,
        source: Arc<dyn ActivitySource>,
        resolver: Arc<ResourceIdResolver>,
        config: FeedConfig,
    ) -> Self {
        Self {
            kind,
            source,
            resolver,
            config,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Fetches and interprets the next page after `cursor_token`.
    ///
    /// An empty token starts at `default_start`, or one lag window ago.
    /// `requested_page_size` applies when a window opens; continuation pages
    /// keep the size the window was opened with.
    pub async fn poll(
        &self,
        cursor_token: &str,
        requested_page_size: u32,
        default_start: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> SyncResult<PollResult> {
        let mut cursor = EventCursor::decode(cursor_token)?;
        let continuation = cursor.is_mid_window();
        cursor.open_window(default_start.unwrap_or_else(|| Utc::now() - self.config.lag_window));

        let page_size = self.page_size(&cursor, requested_page_size);
        cursor.page_size = page_size;

        let mut query = ActivityQuery::new(self.kind.application(), page_size);
        query.customer_id = self.config.customer_id.clone();
        query.event_name = self.kind.event_name().map(str::to_string);
        if continuation {
            query.page_token = Some(cursor.next_page_token.clone());
        } else {
            query.start_time = cursor.start_at;
        }

        let page = self
            .source
            .list_activities(&query, cancel)
            .await
            .map_err(|e| classify(e, &format!("listing {} activities", self.kind.application())))?;

        let mut events = Vec::new();
        let fetched = page.items.len();
        for activity in &page.items {
            cursor.observe(activity.occurred_at());

            match self.interpret(activity, cancel).await {
                Ok(mut interpreted) => events.append(&mut interpreted),
                Err(_) if cancel.is_cancelled() => {
                    return Err(SyncError::unavailable(format!(
                        "{} poll cancelled",
                        self.kind
                    )));
                }
                Err(err) => warn!(
                    feed = %self.kind,
                    qualifier = %activity.id.unique_qualifier,
                    error = %err,
                    "skipping activity"
                ),
            }
        }

        cursor.advance(page.next_page_token);
        let has_more = cursor.is_mid_window();
        info!(
            feed = %self.kind,
            fetched,
            events = events.len(),
            has_more,
            "polled activity page"
        );

        Ok(PollResult {
            events,
            cursor: cursor.encode()?,
            has_more,
        })
    }

    fn page_size(&self, cursor: &EventCursor, requested: u32) -> u32 {
        let size = if cursor.is_mid_window() && cursor.page_size > 0 {
            cursor.page_size
        } else if requested > 0 {
            requested
        } else {
            self.config.default_page_size
        };
        size.clamp(1, MAX_PAGE_SIZE)
    }

    async fn interpret(
        &self,
        activity: &Activity,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<NormalizedEvent>> {
        match self.kind {
            FeedKind::Usage => interpret_usage(activity),
            FeedKind::Admin => self.resolve_admin(activity, cancel).await,
        }
    }

    async fn resolve_admin(
        &self,
        activity: &Activity,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<NormalizedEvent>> {
        let occurred_at = activity.occurred_at();
        let mut events = Vec::new();

        for change in interpret_admin(activity) {
            match self
                .resolver
                .resolve(change.resource_type, &change.email, cancel)
                .await?
            {
                Some(id) => events.push(NormalizedEvent::resource_change(
                    activity.id.unique_qualifier.clone(),
                    occurred_at,
                    change.resource_type,
                    id,
                )),
                None => debug!(
                    resource_type = %change.resource_type,
                    email = %change.email,
                    "dropping change to a resource that no longer exists"
                ),
            }
        }

        Ok(events)
    }
}

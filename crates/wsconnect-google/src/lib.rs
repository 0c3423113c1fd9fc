//! Resilient synchronization layer for Google Workspace.
//!
//! This crate polls the Admin SDK Reports API into a stream of
//! [`NormalizedEvent`](wsconnect_core::NormalizedEvent)s while tolerating the
//! API's transient failures and quota limits:
//!
//! - [`transient`] - which transport failures are safe to retry
//! - [`transport`] - HTTP round-trips with bounded exponential backoff
//! - [`classify`] - API failures mapped onto [`ErrorKind`]s
//! - [`services`] - scoped, cached API clients with readonly-scope escalation
//! - [`resolver`] - cached email to resource id lookups
//! - [`cursor`] - the opaque resume point handed back to the host
//! - [`feed`] - one poll of the admin or usage activity log
//!
//! # Architecture
//!
//! ```text
//!  host ──poll(cursor)──▶ EventFeed ──▶ ActivitySource ──▶ AdminClient
//!                            │                                 │
//!                            ▼                                 ▼
//!                   ResourceIdResolver ──▶ DirectoryLookup   ServiceCache ──▶ TokenSource
//!                                                              │
//!                                                              ▼
//!                                                     RetryingTransport ──▶ HttpTransport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use wsconnect_google::{Connector, ConnectorConfig, CredentialSource};
//!
//! let config = ConnectorConfig::new("admin@example.com", CredentialSource::file("key.json"))
//!     .with_customer_id("C0123abcd");
//! let connector = Connector::new(config)?;
//! let feed = connector.admin_feed();
//! let page = feed.poll("", 100, None, &CancellationToken::new()).await?;
//! ```

pub mod activity;
pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod connector;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod resolver;
pub mod services;
pub mod transient;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{
    AuthError, JwtTokenSource, ScopedCredentials, ServiceAccountKey, TokenInfo, TokenSource,
};
pub use classify::classify;
pub use client::{AdminClient, Endpoints};
pub use config::{ConnectorConfig, CredentialSource};
pub use connector::Connector;
pub use cursor::EventCursor;
pub use error::{ErrorKind, RateLimitDetail, RequestError, SyncError, SyncResult};
pub use feed::{ActivitySource, EventFeed, FeedConfig, FeedKind, PollResult};
pub use resolver::{DirectoryLookup, Lookup, ResourceIdResolver, ServiceDirectory};
pub use services::{ServiceCache, scopes};
pub use transient::is_transient;
pub use transport::{
    BoxFuture, HttpTransport, ReqwestTransport, RetryPolicy, RetryingTransport, TransportError,
};

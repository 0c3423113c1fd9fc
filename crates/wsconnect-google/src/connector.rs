//! Wiring of transport, credentials, caches and feeds.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::info;

use crate::auth::{JwtTokenSource, TokenSource};
use crate::config::ConnectorConfig;
use crate::error::{SyncError, SyncResult};
use crate::feed::{EventFeed, FeedConfig, FeedKind, ServiceActivitySource};
use crate::resolver::{ResourceIdResolver, ServiceDirectory};
use crate::services::ServiceCache;
use crate::transport::{HttpTransport, ReqwestTransport, RetryingTransport};

/// A connector to one Workspace tenant.
///
/// Owns the client cache and the id resolver; every feed it hands out shares
/// them.
pub struct Connector {
    config: ConnectorConfig,
    services: Arc<ServiceCache>,
    resolver: Arc<ResourceIdResolver>,
}

impl Connector {
    /// Validates `config`, loads the key and builds the connector.
    ///
    /// No network call is made until the first poll.
    pub fn new(config: ConnectorConfig) -> SyncResult<Self> {
        config.validate().map_err(SyncError::invalid_argument)?;

        let http = ReqwestTransport::new(config.timeout, &config.user_agent).map_err(|e| {
            SyncError::failed_precondition(format!("building HTTP client: {e}")).with_source(e)
        })?;
        let transport = Arc::new(RetryingTransport::new(Arc::new(http)));

        let key = config.credentials.load().map_err(|e| {
            SyncError::invalid_argument(format!("loading credentials: {e}")).with_source(e)
        })?;
        info!(
            service_account = %key.client_email,
            admin = %config.admin_email,
            customer = config.customer_id.as_deref().or(config.domain.as_deref()).unwrap_or(""),
            "configured workspace connector"
        );
        let tokens = JwtTokenSource::new(key, config.admin_email.clone(), Arc::clone(&transport))
            .map_err(|e| {
                SyncError::invalid_argument(format!("loading credentials: {e}")).with_source(e)
            })?;

        Ok(Self::with_parts(config, Arc::new(tokens), transport))
    }

    /// Builds a connector over an existing token source and transport.
    pub fn with_parts(
        config: ConnectorConfig,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<RetryingTransport>,
    ) -> Self {
        let services = Arc::new(ServiceCache::new(
            tokens,
            transport,
            config.endpoints.clone(),
        ));
        let resolver = Arc::new(ResourceIdResolver::new(Arc::new(ServiceDirectory::new(
            Arc::clone(&services),
        ))));

        Self {
            config,
            services,
            resolver,
        }
    }

    /// Builds a connector over a raw transport, with the default retry policy.
    pub fn with_transport(
        config: ConnectorConfig,
        tokens: Arc<dyn TokenSource>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::with_parts(config, tokens, Arc::new(RetryingTransport::new(http)))
    }

    pub fn admin_feed(&self) -> EventFeed {
        self.feed(FeedKind::Admin)
    }

    pub fn usage_feed(&self) -> EventFeed {
        self.feed(FeedKind::Usage)
    }

    pub fn feed(&self, kind: FeedKind) -> EventFeed {
        EventFeed::new(
            kind,
            Arc::new(ServiceActivitySource::new(Arc::clone(&self.services))),
            Arc::clone(&self.resolver),
            self.feed_config(),
        )
    }

    fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            customer_id: self.config.customer_id.clone(),
            lag_window: TimeDelta::from_std(self.config.lag_window)
                .unwrap_or_else(|_| FeedConfig::default().lag_window),
            default_page_size: self.config.page_size,
        }
    }
}

//! Connector configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{AuthError, ServiceAccountKey};
use crate::client::Endpoints;
use crate::feed::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Where the service account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A key file downloaded from the Cloud console.
    File(PathBuf),
    /// The key JSON itself.
    Inline(String),
}

impl CredentialSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn inline(json: impl Into<String>) -> Self {
        Self::Inline(json.into())
    }

    /// Reads and parses the key.
    pub fn load(&self) -> Result<ServiceAccountKey, AuthError> {
        match self {
            Self::File(path) => ServiceAccountKey::from_file(path),
            Self::Inline(json) => ServiceAccountKey::from_json(json),
        }
    }
}

/// Configuration for a Workspace connector.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Workspace customer id, e.g. `C0123abcd`.
    pub customer_id: Option<String>,
    /// Primary domain of the tenant.
    pub domain: Option<String>,
    /// Admin the service account impersonates.
    pub admin_email: String,
    pub credentials: CredentialSource,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
    /// How far back a cursor-less poll starts.
    pub lag_window: Duration,
    /// Page size when the caller requests none.
    pub page_size: u32,
    pub endpoints: Endpoints,
}

impl ConnectorConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default lag window in seconds.
    pub const DEFAULT_LAG_WINDOW_SECS: u64 = 3600;

    pub fn new(admin_email: impl Into<String>, credentials: CredentialSource) -> Self {
        Self {
            customer_id: None,
            domain: None,
            admin_email: admin_email.into(),
            credentials,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("wsconnect/{}", env!("CARGO_PKG_VERSION")),
            lag_window: Duration::from_secs(Self::DEFAULT_LAG_WINDOW_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_lag_window(mut self, lag_window: Duration) -> Self {
        self.lag_window = lag_window;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Validates the configuration.
    ///
    /// Checks field shapes only; the key itself is parsed when the connector
    /// is built.
    pub fn validate(&self) -> Result<(), String> {
        let customer_id = self.customer_id.as_deref().map(str::trim).unwrap_or("");
        let domain = self.domain.as_deref().map(str::trim).unwrap_or("");
        if customer_id.is_empty() && domain.is_empty() {
            return Err("either customer_id or domain is required".to_string());
        }
        if !domain.is_empty() && (domain.contains('@') || !domain.contains('.')) {
            return Err(format!("domain {domain:?} is not a domain name"));
        }

        let admin = self.admin_email.trim();
        if admin.is_empty() {
            return Err("admin_email is required".to_string());
        }
        match admin.split_once('@') {
            Some((local, host)) if !local.is_empty() && host.contains('.') => {}
            _ => return Err(format!("admin_email {admin:?} is not an email address")),
        }

        match &self.credentials {
            CredentialSource::File(path) if path.as_os_str().is_empty() => {
                return Err("credentials file path is empty".to_string());
            }
            CredentialSource::Inline(json) if json.trim().is_empty() => {
                return Err("inline credentials are empty".to_string());
            }
            _ => {}
        }

        if self.timeout.is_zero() {
            return Err("timeout must be positive".to_string());
        }
        if self.lag_window.is_zero() {
            return Err("lag_window must be positive".to_string());
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(format!("page_size must be between 1 and {MAX_PAGE_SIZE}"));
        }
        if self.user_agent.trim().is_empty() {
            return Err("user_agent is required".to_string());
        }
        Ok(())
    }
}

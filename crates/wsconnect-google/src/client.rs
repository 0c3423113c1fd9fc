//! Authenticated Admin SDK client.

use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::activity::{ActivityPage, ActivityQuery};
use crate::auth::ScopedCredentials;
use crate::classify::rate_limit_from_headers;
use crate::error::{ApiErrorResponse, RequestError};
use crate::resolver::Lookup;
use crate::transport::{RetryingTransport, TransportError};

/// Base URL of the Admin SDK.
const ADMIN_API_BASE: &str = "https://admin.googleapis.com";

/// Where the Admin SDK lives. Overridable for tests and proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(ADMIN_API_BASE)
    }
}

impl Endpoints {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn activities(&self, application: &str) -> String {
        format!(
            "{}/admin/reports/v1/activity/users/all/applications/{}",
            self.base,
            urlencoding::encode(application)
        )
    }

    fn group(&self, email: &str) -> String {
        format!(
            "{}/admin/directory/v1/groups/{}",
            self.base,
            urlencoding::encode(email)
        )
    }

    fn user(&self, email: &str) -> String {
        format!(
            "{}/admin/directory/v1/users/{}",
            self.base,
            urlencoding::encode(email)
        )
    }
}

/// A directory entry; only the id is consumed.
#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    id: String,
}

/// An Admin SDK client bound to one OAuth scope.
pub struct AdminClient {
    credentials: ScopedCredentials,
    transport: Arc<RetryingTransport>,
    endpoints: Endpoints,
}

impl AdminClient {
    pub fn new(
        credentials: ScopedCredentials,
        transport: Arc<RetryingTransport>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            credentials,
            transport,
            endpoints,
        }
    }

    /// The scope this client's token was granted for.
    pub fn scope(&self) -> &str {
        self.credentials.scope()
    }

    /// Fetches one page of `activities.list`.
    pub async fn list_activities(
        &self,
        query: &ActivityQuery,
        cancel: &CancellationToken,
    ) -> Result<ActivityPage, RequestError> {
        let mut url = parse_url(&self.endpoints.activities(&query.application))?;
        url.query_pairs_mut().extend_pairs(query.query_pairs());

        let page: ActivityPage = self.get_json(url, cancel).await?;
        debug!(
            application = %query.application,
            items = page.items.len(),
            has_next = page.next_page_token.is_some(),
            "fetched activity page"
        );
        Ok(page)
    }

    /// Looks up a group's id by email.
    pub async fn lookup_group(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Lookup, RequestError> {
        self.lookup(self.endpoints.group(email), cancel).await
    }

    /// Looks up a user's id by primary email.
    pub async fn lookup_user(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Lookup, RequestError> {
        self.lookup(self.endpoints.user(email), cancel).await
    }

    async fn lookup(&self, url: String, cancel: &CancellationToken) -> Result<Lookup, RequestError> {
        match self.get_json::<DirectoryEntry>(parse_url(&url)?, cancel).await {
            Ok(entry) => Ok(Lookup::Found(entry.id)),
            Err(RequestError::Api(api)) if matches!(api.status, 404 | 410) => Ok(Lookup::NotFound),
            Err(err) => Err(err),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        cancel: &CancellationToken,
    ) -> Result<T, RequestError> {
        let bearer = self.credentials.bearer(cancel).await?;
        let authorization = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|e| TransportError::new("access token is not a valid header").with_source(e))?;

        let mut request = reqwest::Request::new(reqwest::Method::GET, url);
        request.headers_mut().insert(AUTHORIZATION, authorization);
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self.transport.send(request, cancel).await?;
        let status = response.status();
        let rate_limit = rate_limit_from_headers(response.headers(), Utc::now());
        let body = response.text().await.map_err(TransportError::from)?;

        if !status.is_success() {
            return Err(ApiErrorResponse::from_body(status.as_u16(), &body)
                .with_rate_limit(rate_limit)
                .into());
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn parse_url(raw: &str) -> Result<reqwest::Url, RequestError> {
    reqwest::Url::parse(raw)
        .map_err(|e| TransportError::new(format!("invalid url {raw}")).with_source(e).into())
}

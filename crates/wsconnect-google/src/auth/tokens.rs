//! Access tokens and their refresh.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AuthError, TokenSource};

/// Refresh this long before the provider's expiry.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// An access token for one scope.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    /// When the token should be considered expired (already buffered).
    pub expires_at: Option<DateTime<Utc>>,
    /// The scope the token was issued for.
    pub scope: String,
}

impl TokenInfo {
    /// Creates a token from a token endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        scope: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let expires_at = expires_in_secs
            .map(|secs| now + Duration::seconds(secs) - Duration::seconds(EXPIRY_BUFFER_SECS));

        Self {
            access_token: access_token.into(),
            expires_at,
            scope: scope.into(),
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

}

/// The live credential behind one cached client.
///
/// Holds the current token for `scope` and transparently fetches a new one
/// from the [`TokenSource`] once it expires. The cache entry owning this
/// never has to be evicted for a token to be renewed.
pub struct ScopedCredentials {
    scope: String,
    source: Arc<dyn TokenSource>,
    token: Mutex<TokenInfo>,
}

impl ScopedCredentials {
    pub fn new(source: Arc<dyn TokenSource>, token: TokenInfo) -> Self {
        Self {
            scope: token.scope.clone(),
            source,
            token: Mutex::new(token),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns a bearer token, refreshing it first if expired.
    pub async fn bearer(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            debug!(scope = %self.scope, "access token expired, refreshing");
            *token = self.source.fetch_token(&self.scope, cancel).await?;
        }
        Ok(token.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticTokenSource;

    #[test]
    fn token_expiry_is_buffered() {
        let token = TokenInfo::new("tok", Some(3600), "scope");
        assert!(!token.is_expired());
        let remaining = token.expires_at.unwrap() - Utc::now();
        assert!(remaining <= Duration::seconds(3600 - EXPIRY_BUFFER_SECS));
        assert!(remaining > Duration::seconds(3000));

        let short = TokenInfo::new("tok", Some(30), "scope");
        assert!(short.is_expired());
    }

    #[test]
    fn token_without_expiry_never_expires() {
        assert!(!TokenInfo::new("tok", None, "scope").is_expired());
    }

    #[tokio::test]
    async fn bearer_reuses_fresh_token() {
        let source = Arc::new(StaticTokenSource::new());
        let credentials =
            ScopedCredentials::new(source.clone(), TokenInfo::new("first", Some(3600), "s"));

        let bearer = credentials.bearer(&CancellationToken::new()).await.unwrap();

        assert_eq!(bearer, "first");
        assert!(source.requested_scopes().is_empty());
    }

    #[tokio::test]
    async fn bearer_refreshes_expired_token() {
        let source = Arc::new(StaticTokenSource::new());
        let mut stale = TokenInfo::new("stale", Some(3600), "s");
        stale.expires_at = Some(Utc::now() - Duration::minutes(1));
        let credentials = ScopedCredentials::new(source.clone(), stale);

        let bearer = credentials.bearer(&CancellationToken::new()).await.unwrap();

        assert_eq!(bearer, "token-for-s");
        assert_eq!(source.requested_scopes(), vec!["s".to_string()]);
        assert_eq!(credentials.scope(), "s");
    }
}

//! Scoped API clients, cached by OAuth scope.
//!
//! Clients are requested at the narrowest scope that serves the call. When
//! domain-wide delegation does not grant a `.readonly` scope but does grant
//! its read-write parent, the cache escalates once to the parent and keeps
//! the client under that scope. Entries are never evicted; expiring tokens
//! are refreshed inside [`ScopedCredentials`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, ScopedCredentials, TokenSource};
use crate::client::{AdminClient, Endpoints};
use crate::transport::RetryingTransport;

/// OAuth scopes used by the feeds.
pub mod scopes {
    pub const REPORTS_AUDIT_READONLY: &str =
        "https://www.googleapis.com/auth/admin.reports.audit.readonly";
    pub const DIRECTORY_GROUP_READONLY: &str =
        "https://www.googleapis.com/auth/admin.directory.group.readonly";
    pub const DIRECTORY_USER_READONLY: &str =
        "https://www.googleapis.com/auth/admin.directory.user.readonly";

    const READONLY_SUFFIX: &str = ".readonly";

    /// The read-write parent of a `.readonly` scope.
    pub fn escalated(scope: &str) -> Option<&str> {
        scope
            .strip_suffix(READONLY_SUFFIX)
            .filter(|parent| !parent.is_empty())
    }
}

pub struct ServiceCache {
    token_source: Arc<dyn TokenSource>,
    transport: Arc<RetryingTransport>,
    endpoints: Endpoints,
    clients: Mutex<HashMap<String, Arc<AdminClient>>>,
}

impl ServiceCache {
    pub fn new(
        token_source: Arc<dyn TokenSource>,
        transport: Arc<RetryingTransport>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            token_source,
            transport,
            endpoints,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a client able to serve `scope`.
    ///
    /// If neither `scope` nor its escalation can be authorized, the error for
    /// `scope` itself is returned.
    pub async fn get(
        &self,
        scope: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<AdminClient>, AuthError> {
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(scope) {
            return Ok(Arc::clone(client));
        }
        let parent = scopes::escalated(scope);
        if let Some(client) = parent.and_then(|parent| clients.get(parent)) {
            debug!(%scope, granted = %client.scope(), "reusing escalated client");
            return Ok(Arc::clone(client));
        }

        let token = match self.token_source.fetch_token(scope, cancel).await {
            Ok(token) => token,
            Err(err) if err.is_unauthorized() => {
                let Some(parent) = parent else {
                    return Err(err);
                };
                info!(%scope, escalated = %parent, "scope not granted, escalating");
                match self.token_source.fetch_token(parent, cancel).await {
                    Ok(token) => token,
                    Err(escalation) => {
                        warn!(%scope, error = %escalation, "scope escalation failed");
                        return Err(err);
                    }
                }
            }
            Err(err) => return Err(err),
        };

        let granted = token.scope.clone();
        let client = Arc::new(AdminClient::new(
            ScopedCredentials::new(Arc::clone(&self.token_source), token),
            Arc::clone(&self.transport),
            self.endpoints.clone(),
        ));
        clients.insert(granted, Arc::clone(&client));
        Ok(client)
    }

    /// Scopes with a cached client.
    pub async fn cached_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<_> = self.clients.lock().await.keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

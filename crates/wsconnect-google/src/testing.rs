//! Test doubles shared across modules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthError, TokenInfo, TokenSource};
use crate::transport::{BoxFuture, HttpTransport, RetryPolicy, RetryingTransport, TransportError};

/// What a [`ScriptedTransport`] saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: reqwest::Url,
    pub authorization: Option<String>,
    pub body: Option<String>,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

type Handler =
    dyn Fn(&RecordedRequest) -> Result<http::Response<String>, TransportError> + Send + Sync;

/// Answers requests from a closure and records them.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<http::Response<String>, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A transport for code paths that must not reach the network.
    pub fn unreachable() -> Self {
        Self::new(|request| {
            Err(TransportError::new(format!(
                "unexpected request to {}",
                request.url
            )))
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(
        &self,
        request: reqwest::Request,
    ) -> BoxFuture<'_, Result<reqwest::Response, TransportError>> {
        let recorded = RecordedRequest {
            method: request.method().to_string(),
            url: request.url().clone(),
            authorization: request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: request
                .body()
                .and_then(|body| body.as_bytes())
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        };
        let outcome = (self.handler)(&recorded);
        self.requests.lock().unwrap().push(recorded);

        Box::pin(async move { outcome.map(reqwest::Response::from) })
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> http::Response<String> {
    http::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(body.to_string())
        .unwrap()
}

/// Wraps `inner` with a retry policy fast enough for unpaused tests.
pub fn retrying<T: HttpTransport + 'static>(inner: Arc<T>) -> Arc<RetryingTransport> {
    Arc::new(RetryingTransport::with_policy(
        inner,
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        },
    ))
}

/// Issues `token-for-{scope}`, refusing scopes marked unauthorized.
#[derive(Default)]
pub struct StaticTokenSource {
    unauthorized: Vec<String>,
    requested: Mutex<Vec<String>>,
}

impl StaticTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(scopes: &[&str]) -> Self {
        Self {
            unauthorized: scopes.iter().map(|s| s.to_string()).collect(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_scopes(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl TokenSource for StaticTokenSource {
    fn fetch_token<'a>(
        &'a self,
        scope: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<TokenInfo, AuthError>> {
        self.requested.lock().unwrap().push(scope.to_string());
        let outcome = if self.unauthorized.iter().any(|s| s == scope) {
            Err(AuthError::Unauthorized {
                scope: scope.to_string(),
                message: "unauthorized_client".to_string(),
            })
        } else {
            Ok(TokenInfo::new(format!("token-for-{scope}"), Some(3600), scope))
        };
        Box::pin(async move {
            tokio::task::yield_now().await;
            outcome
        })
    }
}

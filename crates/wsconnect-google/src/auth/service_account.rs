//! Service account keys and the JWT-bearer token grant.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RequestError;
use crate::transport::{BoxFuture, RetryingTransport, TransportError};

use super::{AuthError, TokenInfo, TokenSource};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Assertions are valid for the maximum Google accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// A Google service account key, as downloaded from the Cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parses a key from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let key: Self = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidKey(format!("failed to parse key JSON: {e}")))?;
        key.validate()?;
        Ok(key)
    }

    /// Reads and parses a key file.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::InvalidKey(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.client_email.trim().is_empty() {
            return Err(AuthError::InvalidKey("client_email is empty".to_string()));
        }
        if !self.private_key.contains("PRIVATE KEY") {
            return Err(AuthError::InvalidKey(
                "private_key is not a PEM private key".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Issues delegated-admin tokens with the JWT-bearer grant.
pub struct JwtTokenSource {
    key: ServiceAccountKey,
    subject: String,
    encoding_key: EncodingKey,
    transport: Arc<RetryingTransport>,
}

impl JwtTokenSource {
    /// Creates a source impersonating `subject` (the delegated admin).
    pub fn new(
        key: ServiceAccountKey,
        subject: impl Into<String>,
        transport: Arc<RetryingTransport>,
    ) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidKey(format!("unusable private key: {e}")))?;

        Ok(Self {
            key,
            subject: subject.into(),
            encoding_key,
            transport,
        })
    }

    fn assertion(&self, scope: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let claims = Claims {
            iss: self.key.client_email.clone(),
            sub: self.subject.clone(),
            scope: scope.to_string(),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidKey(format!("failed to sign assertion: {e}")))
    }

    fn token_request(&self, assertion: &str) -> Result<reqwest::Request, AuthError> {
        let url = reqwest::Url::parse(&self.key.token_uri)
            .map_err(|e| AuthError::InvalidKey(format!("invalid token_uri: {e}")))?;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", assertion)
            .finish();

        let mut request = reqwest::Request::new(reqwest::Method::POST, url);
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        *request.body_mut() = Some(body.into());
        Ok(request)
    }

    async fn exchange(
        &self,
        scope: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenInfo, AuthError> {
        let assertion = self.assertion(scope, Utc::now())?;
        let request = self.token_request(&assertion)?;

        debug!(%scope, subject = %self.subject, "requesting delegated access token");
        let response = self.transport.send(request, cancel).await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RequestError::from(TransportError::from(e)))?;

        if !status.is_success() {
            return Err(token_error(scope, status.as_u16(), &body));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(RequestError::from)?;

        info!(%scope, "obtained delegated access token");
        Ok(TokenInfo::new(token.access_token, token.expires_in, scope))
    }
}

/// Interprets a token endpoint error.
///
/// Google answers a scope that domain-wide delegation does not grant with
/// `unauthorized_client`, which is what triggers scope escalation.
fn token_error(scope: &str, status: u16, body: &str) -> AuthError {
    let (code, message) = match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(parsed) => {
            let message = match parsed.error_description {
                Some(description) => format!("{}: {}", parsed.error, description),
                None => parsed.error.clone(),
            };
            (Some(parsed.error), message)
        }
        Err(_) => (None, body.trim().to_string()),
    };

    if status == 401 || code.as_deref() == Some("unauthorized_client") {
        AuthError::Unauthorized {
            scope: scope.to_string(),
            message,
        }
    } else {
        AuthError::Rejected { status, message }
    }
}

impl TokenSource for JwtTokenSource {
    fn fetch_token<'a>(
        &'a self,
        scope: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<TokenInfo, AuthError>> {
        Box::pin(self.exchange(scope, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, json_response, retrying};
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use serde_json::json;

    const KEY_JSON: &str = include_str!("../../testdata/service-account.json");
    const PUBLIC_KEY: &str = include_str!("../../testdata/test-key.pub.pem");
    const SCOPE: &str = "https://www.googleapis.com/auth/admin.reports.audit.readonly";

    fn source(transport: Arc<ScriptedTransport>) -> JwtTokenSource {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        JwtTokenSource::new(key, "admin@example.com", retrying(transport)).unwrap()
    }

    #[test]
    fn parses_console_key_file() {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        assert_eq!(
            key.client_email,
            "sync@wsconnect-test.iam.gserviceaccount.com"
        );
        assert_eq!(key.private_key_id.as_deref(), Some("0123456789abcdef"));
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(!format!("{key:?}").contains("BEGIN"));
    }

    #[test]
    fn rejects_incomplete_keys() {
        let err = ServiceAccountKey::from_json(r#"{"client_email": "x@y", "private_key": "nope"}"#)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidKey(_)));

        let err = ServiceAccountKey::from_json("not json").unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn reads_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, KEY_JSON).unwrap();

        let key = ServiceAccountKey::from_file(&path).unwrap();
        assert_eq!(key.private_key_id.as_deref(), Some("0123456789abcdef"));

        let missing = ServiceAccountKey::from_file(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn assertion_carries_delegation_claims() {
        let source = source(Arc::new(ScriptedTransport::unreachable()));
        let now = Utc::now();
        let assertion = source.assertion(SCOPE, now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[DEFAULT_TOKEN_URI]);
        let decoded = decode::<Claims>(
            &assertion,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.header.kid.as_deref(), Some("0123456789abcdef"));
        assert_eq!(decoded.claims.sub, "admin@example.com");
        assert_eq!(decoded.claims.scope, SCOPE);
        assert_eq!(decoded.claims.exp - decoded.claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[tokio::test]
    async fn exchanges_assertion_for_token() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(json_response(
                200,
                json!({"access_token": "ya29.abc", "expires_in": 3599, "token_type": "Bearer"}),
            ))
        }));
        let source = source(transport.clone());

        let token = source
            .fetch_token(SCOPE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.scope, SCOPE);
        assert!(!token.is_expired());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        let body = requests[0].body.as_deref().unwrap();
        assert!(body.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
        assert!(body.contains("assertion="));
    }

    #[tokio::test]
    async fn unauthorized_client_is_unauthorized() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(json_response(
                401,
                json!({
                    "error": "unauthorized_client",
                    "error_description": "Client is unauthorized to retrieve access tokens using this method"
                }),
            ))
        }));
        let err = source(transport)
            .fetch_token(SCOPE, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("unauthorized_client"));
    }

    #[test]
    fn other_token_errors_are_rejections() {
        let err = token_error(SCOPE, 400, r#"{"error": "invalid_grant"}"#);
        assert!(matches!(err, AuthError::Rejected { status: 400, .. }));

        let err = token_error(SCOPE, 400, r#"{"error": "unauthorized_client"}"#);
        assert!(err.is_unauthorized());

        let err = token_error(SCOPE, 503, "upstream down");
        assert!(matches!(err, AuthError::Rejected { status: 503, ref message } if message == "upstream down"));
    }
}

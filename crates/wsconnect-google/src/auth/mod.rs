//! Delegated-admin credentials for Google APIs.
//!
//! A [`TokenSource`] turns an OAuth scope into an access token. The
//! production source, [`JwtTokenSource`], signs a JWT-bearer assertion with
//! the service account key and impersonates the configured admin.
//! [`ScopedCredentials`] keeps the token of one scope fresh.

mod service_account;
mod tokens;

pub use service_account::{JwtTokenSource, ServiceAccountKey};
pub use tokens::{ScopedCredentials, TokenInfo};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::RequestError;
use crate::transport::BoxFuture;

/// Errors from acquiring an access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint refused the scope for this subject. For
    /// domain-wide delegation this means the scope is not granted.
    #[error("unauthorized for scope {scope}: {message}")]
    Unauthorized { scope: String, message: String },

    /// The token endpoint answered with another error status.
    #[error("token request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service account key is missing or malformed.
    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    /// The token request itself failed.
    #[error("token request failed: {0}")]
    Request(#[source] Box<RequestError>),
}

impl AuthError {
    /// Returns true for an unauthorized token response.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<RequestError> for AuthError {
    fn from(err: RequestError) -> Self {
        Self::Request(Box::new(err))
    }
}

/// Acquires access tokens for a single OAuth scope.
pub trait TokenSource: Send + Sync {
    fn fetch_token<'a>(
        &'a self,
        scope: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<TokenInfo, AuthError>>;
}

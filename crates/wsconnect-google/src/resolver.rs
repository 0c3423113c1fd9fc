//! Email to durable id resolution, cached per connector.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wsconnect_core::ResourceType;

use crate::classify::classify;
use crate::error::{RequestError, SyncResult};
use crate::services::{ServiceCache, scopes};
use crate::transport::BoxFuture;

/// The outcome of a directory lookup that reached the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    /// The resource does not exist (any more).
    NotFound,
}

/// Looks resources up by email in the directory.
pub trait DirectoryLookup: Send + Sync {
    fn lookup<'a>(
        &'a self,
        resource_type: ResourceType,
        email: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Lookup, RequestError>>;
}

/// Resolves emails to durable ids, remembering every answer.
///
/// A confirmed absence is cached as `None`, so a deleted resource referenced
/// by many activities costs one lookup. Nothing is ever evicted.
pub struct ResourceIdResolver {
    directory: Arc<dyn DirectoryLookup>,
    cache: Mutex<HashMap<(ResourceType, String), Option<String>>>,
}

impl ResourceIdResolver {
    pub fn new(directory: Arc<dyn DirectoryLookup>) -> Self {
        Self {
            directory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `email` to an id, or `None` if the resource is gone.
    ///
    /// The cache lock is held across the lookup so concurrent misses for the
    /// same email cost one call.
    pub async fn resolve(
        &self,
        resource_type: ResourceType,
        email: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<String>> {
        let key = (resource_type, email.trim().to_lowercase());
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(&key) {
            debug!(%resource_type, email = %key.1, "resource id cache hit");
            return Ok(cached.clone());
        }

        let resolved = match self
            .directory
            .lookup(resource_type, &key.1, cancel)
            .await
            .map_err(|e| classify(e, &format!("resolving {resource_type} {}", key.1)))?
        {
            Lookup::Found(id) => Some(id),
            Lookup::NotFound => {
                debug!(%resource_type, email = %key.1, "resource no longer exists");
                None
            }
        };

        cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Number of cached answers.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Directory lookups through the Admin SDK, at the narrowest scope.
pub struct ServiceDirectory {
    services: Arc<ServiceCache>,
}

impl ServiceDirectory {
    pub fn new(services: Arc<ServiceCache>) -> Self {
        Self { services }
    }

    async fn lookup_email(
        &self,
        resource_type: ResourceType,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Lookup, RequestError> {
        match resource_type {
            ResourceType::Group => {
                let client = self
                    .services
                    .get(scopes::DIRECTORY_GROUP_READONLY, cancel)
                    .await?;
                client.lookup_group(email, cancel).await
            }
            ResourceType::User => {
                let client = self
                    .services
                    .get(scopes::DIRECTORY_USER_READONLY, cancel)
                    .await?;
                client.lookup_user(email, cancel).await
            }
            // Roles and apps are not addressed by email.
            ResourceType::Role | ResourceType::App => Ok(Lookup::NotFound),
        }
    }
}

impl DirectoryLookup for ServiceDirectory {
    fn lookup<'a>(
        &'a self,
        resource_type: ResourceType,
        email: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Lookup, RequestError>> {
        Box::pin(self.lookup_email(resource_type, email, cancel))
    }
}

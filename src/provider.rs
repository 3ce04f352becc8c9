//! Credentials provider trait definition.
//!
//! This module defines the [`CredentialsProvider`] trait that every credential
//! source implements, plus [`CredentialsProviderChain`] which composes several
//! providers into a first-available-wins resolution order.

use crate::store::CredentialsStore;
use crate::{Credentials, CredentialsId, CredmuxError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A source of AWS credentials.
///
/// All implementations must be `Send + Sync` so they can be shared between
/// async tasks behind an `Arc`.
///
/// # Implementations
///
/// - **Shared files**: [`SharedCredentialsProvider`](crate::providers::profile::SharedCredentialsProvider)
/// - **Environment**: [`EnvVarsCredentialsProvider`](crate::providers::env::EnvVarsCredentialsProvider)
/// - **Testing**: [`MockCredentialsProvider`](crate::providers::mock::MockCredentialsProvider)
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Returns the identifier naming this provider.
    fn credentials_id(&self) -> &CredentialsId;

    /// Checks whether the provider can currently produce credentials.
    ///
    /// Cheap: never performs network calls.
    async fn is_available(&self) -> bool;

    /// Fetches credentials.
    ///
    /// May touch the environment, spawn a process, or call out to a
    /// configured collaborator (role assumption, SSO).
    ///
    /// # Errors
    ///
    /// Any failure is returned as-is; callers such as
    /// [`CredentialsStore`](crate::CredentialsStore) never cache failures.
    async fn get_credentials(&self) -> Result<Credentials>;

    /// Returns the region configured alongside the credentials, if any.
    fn get_default_region(&self) -> Option<String>;

    /// Fingerprint of the provider's backing configuration.
    ///
    /// When this value changes, credentials cached for the provider are
    /// discarded and fetched again.
    fn get_hash_code(&self) -> u64;
}

/// Ordered list of providers resolved first-available-wins.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use credmux::providers::env::EnvVarsCredentialsProvider;
/// use credmux::{CredentialsProviderChain, Env};
///
/// let env = Env::from_vars([("AWS_ACCESS_KEY_ID", "AKID"), ("AWS_SECRET_ACCESS_KEY", "SECRET")]);
/// let chain = CredentialsProviderChain::new()
///     .with_provider(Arc::new(EnvVarsCredentialsProvider::new(env)));
///
/// assert_eq!(chain.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct CredentialsProviderChain {
    providers: Vec<Arc<dyn CredentialsProvider>>,
}

impl CredentialsProviderChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider; earlier providers take precedence.
    pub fn with_provider(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True when the chain holds no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns the first provider reporting itself available.
    pub async fn first_available(&self) -> Option<Arc<dyn CredentialsProvider>> {
        for provider in &self.providers {
            if provider.is_available().await {
                debug!(id = %provider.credentials_id(), "selected credentials provider");
                return Some(Arc::clone(provider));
            }
            debug!(id = %provider.credentials_id(), "credentials provider unavailable, skipping");
        }
        None
    }

    /// Resolves credentials through the store using the first available provider.
    ///
    /// # Errors
    ///
    /// Returns [`CredmuxError::NotSupported`] if no provider is available, or
    /// the fetch error of the selected provider.
    pub async fn resolve(
        &self,
        store: &CredentialsStore,
    ) -> Result<(CredentialsId, Arc<Credentials>)> {
        let provider = self.first_available().await.ok_or_else(|| {
            CredmuxError::NotSupported("no credentials provider in chain is available".to_string())
        })?;

        let id = provider.credentials_id().clone();
        let credentials = store.upsert_credentials(&id, provider).await?;
        Ok((id, credentials))
    }
}

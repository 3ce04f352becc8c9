//! Environment variable credentials.
//!
//! Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
//! on every call rather than once at construction, so changes made to the
//! environment after startup are picked up.

use crate::factory::RefreshOutcome;
use crate::{
    CredentialSource, Credentials, CredentialsId, CredentialsProvider,
    CredentialsProviderFactory, CredmuxError, Env, Result,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Access key environment variable.
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Secret key environment variable.
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Session token environment variable.
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
/// Region environment variable.
pub const AWS_REGION: &str = "AWS_REGION";
/// Region fallback used by older tooling.
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// Credentials from process environment variables.
///
/// # Example
///
/// ```
/// use credmux::providers::env::EnvVarsCredentialsProvider;
/// use credmux::{CredentialsProvider, Env};
///
/// #[tokio::main]
/// async fn main() -> credmux::Result<()> {
///     let env = Env::from_vars([("AWS_ACCESS_KEY_ID", "AKID")]);
///     let provider = EnvVarsCredentialsProvider::new(env.clone());
///     assert!(!provider.is_available().await);
///
///     env.set("AWS_SECRET_ACCESS_KEY", "SECRET");
///     assert!(provider.is_available().await);
///     assert_eq!(provider.get_credentials().await?.secret_access_key, "SECRET");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct EnvVarsCredentialsProvider {
    id: CredentialsId,
    env: Env,
}

impl fmt::Debug for EnvVarsCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvVarsCredentialsProvider")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl EnvVarsCredentialsProvider {
    /// Creates a provider reading from `env`.
    pub fn new(env: Env) -> Self {
        Self {
            id: CredentialsId::env(),
            env,
        }
    }

    fn available(&self) -> bool {
        self.env.get(AWS_ACCESS_KEY_ID).is_some() && self.env.get(AWS_SECRET_ACCESS_KEY).is_some()
    }
}

#[async_trait]
impl CredentialsProvider for EnvVarsCredentialsProvider {
    fn credentials_id(&self) -> &CredentialsId {
        &self.id
    }

    async fn is_available(&self) -> bool {
        self.available()
    }

    async fn get_credentials(&self) -> Result<Credentials> {
        let access_key_id = self
            .env
            .get(AWS_ACCESS_KEY_ID)
            .ok_or_else(|| CredmuxError::MissingEnvironment(AWS_ACCESS_KEY_ID.to_string()))?;
        let secret_access_key = self
            .env
            .get(AWS_SECRET_ACCESS_KEY)
            .ok_or_else(|| CredmuxError::MissingEnvironment(AWS_SECRET_ACCESS_KEY.to_string()))?;

        let mut credentials = Credentials::new(access_key_id, secret_access_key);
        credentials.session_token = self.env.get(AWS_SESSION_TOKEN);
        Ok(credentials)
    }

    fn get_default_region(&self) -> Option<String> {
        self.env
            .get(AWS_REGION)
            .or_else(|| self.env.get(AWS_DEFAULT_REGION))
    }

    fn get_hash_code(&self) -> u64 {
        // Nothing to fingerprint: every fetch reads the live environment.
        0
    }
}

/// Exposes the environment provider while its variables are set.
pub struct EnvVarsCredentialsProviderFactory {
    provider: Arc<EnvVarsCredentialsProvider>,
    available: AtomicBool,
}

impl EnvVarsCredentialsProviderFactory {
    /// Creates a factory reading from `env`.
    ///
    /// The provider is listed only after a `refresh()` has seen both keys.
    pub fn new(env: Env) -> Self {
        Self {
            provider: Arc::new(EnvVarsCredentialsProvider::new(env)),
            available: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CredentialsProviderFactory for EnvVarsCredentialsProviderFactory {
    fn credential_source(&self) -> CredentialSource {
        CredentialSource::Env
    }

    async fn refresh(&self) -> Result<RefreshOutcome> {
        let available = self.provider.available();
        let previous = self.available.swap(available, Ordering::SeqCst);
        if previous != available {
            debug!(available, "environment credentials availability changed");
        }

        Ok(RefreshOutcome {
            reloaded: true,
            ..Default::default()
        })
    }

    fn list_providers(&self) -> Vec<Arc<dyn CredentialsProvider>> {
        if self.available.load(Ordering::SeqCst) {
            vec![self.provider.clone() as Arc<dyn CredentialsProvider>]
        } else {
            Vec::new()
        }
    }
}

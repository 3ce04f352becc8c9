//! Owner of the credential store and provider factories.
//!
//! A [`CredentialsContext`] is constructed explicitly and passed to whatever
//! needs credentials. There is no process-wide instance.

use crate::providers::env::EnvVarsCredentialsProviderFactory;
use crate::providers::profile::SharedCredentialsProviderFactory;
use crate::sso::AuthSsoServer;
use crate::{
    Config, Credentials, CredentialsId, CredentialsProvider, CredentialsProviderChain,
    CredentialsProviderFactory, CredentialsStore, CredmuxError, RefreshOutcome, Result,
};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

/// Credential state for one consumer: a store plus the factories feeding it.
///
/// # Example
///
/// ```no_run
/// use credmux::{Config, CredentialsContext, CredentialsId};
///
/// #[tokio::main]
/// async fn main() -> credmux::Result<()> {
///     let context = CredentialsContext::new(Config::default());
///     context.refresh_all().await?;
///
///     let creds = context
///         .resolve_credentials(&CredentialsId::profile("default"))
///         .await?;
///     println!("access key: {}", creds.access_key_id);
///     Ok(())
/// }
/// ```
pub struct CredentialsContext {
    config: Config,
    store: CredentialsStore,
    factories: Vec<Arc<dyn CredentialsProviderFactory>>,
}

impl CredentialsContext {
    /// Creates a context with the environment and shared-file factories.
    pub fn new(config: Config) -> Self {
        let factories: Vec<Arc<dyn CredentialsProviderFactory>> = vec![
            Arc::new(EnvVarsCredentialsProviderFactory::new(config.env.clone())),
            Arc::new(SharedCredentialsProviderFactory::from_config(&config)),
        ];
        Self::from_parts(config, CredentialsStore::new(), factories)
    }

    /// Creates a context from explicitly built parts.
    ///
    /// Use this to supply factories configured with collaborators, such as a
    /// [`SharedCredentialsProviderFactory`] with a role assumer.
    pub fn from_parts(
        config: Config,
        store: CredentialsStore,
        factories: Vec<Arc<dyn CredentialsProviderFactory>>,
    ) -> Self {
        Self {
            config,
            store,
            factories,
        }
    }

    /// Adds another factory after the existing ones.
    pub fn with_factory(mut self, factory: Arc<dyn CredentialsProviderFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// The configuration this context was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The credentials cache.
    pub fn store(&self) -> &CredentialsStore {
        &self.store
    }

    /// The registered factories, in lookup order.
    pub fn factories(&self) -> &[Arc<dyn CredentialsProviderFactory>] {
        &self.factories
    }

    /// Refreshes every factory concurrently.
    ///
    /// Outcomes are returned in factory order.
    pub async fn refresh_all(&self) -> Result<Vec<RefreshOutcome>> {
        try_join_all(self.factories.iter().map(|factory| factory.refresh())).await
    }

    /// Providers of every factory, in factory order.
    pub fn list_providers(&self) -> Vec<Arc<dyn CredentialsProvider>> {
        self.factories
            .iter()
            .flat_map(|factory| factory.list_providers())
            .collect()
    }

    /// Looks up a provider in the factories serving its credential source.
    pub fn get_provider(&self, id: &CredentialsId) -> Option<Arc<dyn CredentialsProvider>> {
        self.factories
            .iter()
            .filter(|factory| factory.credential_source() == id.credential_source)
            .find_map(|factory| factory.get_provider(id))
    }

    /// Returns credentials for `id`, served from the store when still valid.
    ///
    /// # Errors
    ///
    /// [`CredmuxError::ProfileNotFound`] if no factory knows `id`,
    /// [`CredmuxError::ProviderUnavailable`] if its provider is unavailable,
    /// or the fetch error.
    pub async fn resolve_credentials(&self, id: &CredentialsId) -> Result<Arc<Credentials>> {
        let provider = self
            .get_provider(id)
            .ok_or_else(|| CredmuxError::ProfileNotFound(id.to_string()))?;

        if !provider.is_available().await {
            return Err(CredmuxError::ProviderUnavailable(id.clone()));
        }

        self.store.upsert_credentials(id, provider).await
    }

    /// Drops cached credentials for `id`, e.g. after a downstream call was
    /// rejected.
    pub fn invalidate_credentials(&self, id: &CredentialsId) {
        self.store.invalidate_credentials(id);
    }

    /// Chain of environment credentials, then the `default` profile.
    pub fn default_chain(&self) -> CredentialsProviderChain {
        let mut chain = CredentialsProviderChain::new();
        for id in [CredentialsId::env(), CredentialsId::profile("default")] {
            match self.get_provider(&id) {
                Some(provider) => chain = chain.with_provider(provider),
                None => debug!(%id, "no provider for default chain entry"),
            }
        }
        chain
    }

    /// Creates an SSO redirect server configured from this context.
    pub fn new_sso_server(&self) -> AuthSsoServer {
        AuthSsoServer::from_config(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Env, SsoError};
    use std::time::Duration;
    use tempfile::tempdir;

    const CREDENTIALS: &str = "\
[default]
aws_access_key_id = FILE-AKID
aws_secret_access_key = FILE-SECRET

[dev]
aws_access_key_id = DEV-AKID
aws_secret_access_key = DEV-SECRET
";

    fn context_with(env: Env) -> (tempfile::TempDir, CredentialsContext) {
        let dir = tempdir().unwrap();
        let credentials_file = dir.path().join("credentials");
        std::fs::write(&credentials_file, CREDENTIALS).unwrap();

        let config = Config::from_env(env)
            .with_credentials_file(credentials_file)
            .with_config_file(dir.path().join("config"))
            .with_sso_redirect_path("/callback");
        (dir, CredentialsContext::new(config))
    }

    #[tokio::test]
    async fn test_lists_providers_from_every_factory() {
        let env = Env::from_vars([
            ("AWS_ACCESS_KEY_ID", "ENV-AKID"),
            ("AWS_SECRET_ACCESS_KEY", "ENV-SECRET"),
        ]);
        let (_dir, context) = context_with(env);

        let outcomes = context.refresh_all().await.unwrap();
        assert_eq!(outcomes.len(), 2);

        let ids: Vec<String> = context
            .list_providers()
            .iter()
            .map(|p| p.credentials_id().to_string())
            .collect();
        assert_eq!(ids, vec!["env:default", "profile:default", "profile:dev"]);
    }

    #[tokio::test]
    async fn test_resolve_credentials_caches() {
        let (_dir, context) = context_with(Env::from_vars::<&str, &str>([]));
        context.refresh_all().await.unwrap();

        let id = CredentialsId::profile("dev");
        let first = context.resolve_credentials(&id).await.unwrap();
        let second = context.resolve_credentials(&id).await.unwrap();

        assert_eq!(first.access_key_id, "DEV-AKID");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(context.store().get_credentials(&id).is_some());

        context.invalidate_credentials(&id);
        assert!(context.store().get_credentials(&id).is_none());
    }

    #[tokio::test]
    async fn test_resolve_unknown_profile() {
        let (_dir, context) = context_with(Env::from_vars::<&str, &str>([]));
        context.refresh_all().await.unwrap();

        let err = context
            .resolve_credentials(&CredentialsId::profile("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredmuxError::ProfileNotFound(ref id) if id == "profile:missing"));
    }

    #[tokio::test]
    async fn test_resolve_unavailable_provider() {
        let env = Env::from_vars([
            ("AWS_ACCESS_KEY_ID", "ENV-AKID"),
            ("AWS_SECRET_ACCESS_KEY", "ENV-SECRET"),
        ]);
        let (_dir, context) = context_with(env.clone());
        context.refresh_all().await.unwrap();

        env.remove("AWS_SECRET_ACCESS_KEY");
        let err = context
            .resolve_credentials(&CredentialsId::env())
            .await
            .unwrap_err();
        assert!(matches!(err, CredmuxError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_default_chain_prefers_environment() {
        let env = Env::from_vars([
            ("AWS_ACCESS_KEY_ID", "ENV-AKID"),
            ("AWS_SECRET_ACCESS_KEY", "ENV-SECRET"),
        ]);
        let (_dir, context) = context_with(env.clone());
        context.refresh_all().await.unwrap();

        let chain = context.default_chain();
        assert_eq!(chain.len(), 2);
        let (id, creds) = chain.resolve(context.store()).await.unwrap();
        assert_eq!(id, CredentialsId::env());
        assert_eq!(creds.access_key_id, "ENV-AKID");

        env.remove("AWS_ACCESS_KEY_ID");
        let (id, creds) = chain.resolve(context.store()).await.unwrap();
        assert_eq!(id, CredentialsId::profile("default"));
        assert_eq!(creds.access_key_id, "FILE-AKID");
    }

    #[tokio::test]
    async fn test_sso_server_uses_configured_path() {
        let (_dir, context) = context_with(Env::from_vars::<&str, &str>([]));
        let server = context.new_sso_server();

        let uri = server.start().await.unwrap();
        assert!(uri.ends_with("/callback"));
        server.close().await;
    }

    #[tokio::test]
    async fn test_sso_server_uses_configured_timeout() {
        let dir = tempdir().unwrap();
        let config = Config::from_env(Env::from_vars::<&str, &str>([]))
            .with_credentials_file(dir.path().join("credentials"))
            .with_config_file(dir.path().join("config"))
            .with_sso_timeout(Duration::from_millis(50));
        let context = CredentialsContext::new(config);

        let server = context.new_sso_server();
        assert_eq!(server.timeout(), Duration::from_millis(50));
        server.start().await.unwrap();

        let result = server.wait_for_configured_authorization().await;
        assert!(matches!(result, Err(SsoError::Timeout(d)) if d == Duration::from_millis(50)));
    }
}

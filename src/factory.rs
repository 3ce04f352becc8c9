//! Provider factory trait.
//!
//! A factory owns one credential source (shared files, environment, ...) and
//! rebuilds its set of [`CredentialsProvider`]s whenever `refresh()` runs.

use crate::ini::ParseError;
use crate::profile::ProfileError;
use crate::{CredentialSource, CredentialsId, CredentialsProvider, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// What a `refresh()` observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// False when the backing source was unchanged and nothing was re-read
    pub reloaded: bool,
    /// Syntax errors found in the backing files
    pub parse_errors: Vec<ParseError>,
    /// Why individual profiles were excluded
    pub profile_errors: Vec<ProfileError>,
}

/// Produces providers for one credential source.
///
/// # Example
///
/// ```no_run
/// use credmux::providers::profile::SharedCredentialsProviderFactory;
/// use credmux::{Config, CredentialsProviderFactory};
///
/// #[tokio::main]
/// async fn main() -> credmux::Result<()> {
///     let factory = SharedCredentialsProviderFactory::from_config(&Config::default());
///     let outcome = factory.refresh().await?;
///
///     for err in &outcome.parse_errors {
///         eprintln!("{}", err);
///     }
///     for provider in factory.list_providers() {
///         println!("{}", provider.credentials_id());
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CredentialsProviderFactory: Send + Sync {
    /// The source kind of every provider this factory produces.
    fn credential_source(&self) -> CredentialSource;

    /// Re-reads the backing source and rebuilds the provider set.
    ///
    /// Concurrent calls share one in-flight refresh.
    ///
    /// # Errors
    ///
    /// Only I/O failures are errors. Syntax errors and invalid profiles are
    /// reported in the returned [`RefreshOutcome`].
    async fn refresh(&self) -> Result<RefreshOutcome>;

    /// Returns the currently valid providers.
    fn list_providers(&self) -> Vec<Arc<dyn CredentialsProvider>>;

    /// Looks up one provider by exact id.
    fn get_provider(&self, id: &CredentialsId) -> Option<Arc<dyn CredentialsProvider>> {
        self.list_providers()
            .into_iter()
            .find(|provider| provider.credentials_id() == id)
    }
}

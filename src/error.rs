//! Error types for credential operations.

use crate::credentials::CredentialsId;
use crate::sso::SsoError;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using [`CredmuxError`].
pub type Result<T> = std::result::Result<T, CredmuxError>;

/// Errors that can occur while resolving or caching credentials.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum CredmuxError {
    /// Environment variables required by a provider are not set.
    #[error("credentials not available from environment: {0}")]
    MissingEnvironment(String),

    /// No provider is known for the requested profile or identifier.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// A provider exists but cannot currently supply credentials.
    #[error("credentials provider unavailable: {0}")]
    ProviderUnavailable(CredentialsId),

    /// A string could not be parsed as a [`CredentialsId`].
    #[error("invalid credentials id: {0}")]
    InvalidCredentialsId(String),

    /// Operation requires a collaborator that was not configured.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// External credential command failed.
    #[error("command execution failed: {0}")]
    CommandFailed(String),

    /// Fetching credentials failed.
    ///
    /// The underlying error is shared between every caller that awaited the
    /// same in-flight fetch.
    #[error("failed to fetch credentials for {id}: {source}")]
    Fetch {
        /// Identifier of the provider that failed
        id: CredentialsId,
        /// Underlying error
        #[source]
        source: Arc<CredmuxError>,
    },

    /// Reloading shared profile files failed.
    #[error("failed to refresh profiles: {0}")]
    Refresh(#[source] Arc<CredmuxError>),

    /// SSO redirect capture failed.
    #[error(transparent)]
    Sso(#[from] SsoError),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CredmuxError {
    /// Wraps a shared fetch failure with the identifier it belongs to.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use credmux::{CredentialsId, CredmuxError};
    ///
    /// let inner = Arc::new(CredmuxError::CommandFailed("exit 1".to_string()));
    /// let err = CredmuxError::fetch(CredentialsId::profile("dev"), inner);
    ///
    /// assert_eq!(
    ///     err.to_string(),
    ///     "failed to fetch credentials for profile:dev: command execution failed: exit 1"
    /// );
    /// ```
    pub fn fetch(id: CredentialsId, source: Arc<CredmuxError>) -> Self {
        Self::Fetch { id, source }
    }
}

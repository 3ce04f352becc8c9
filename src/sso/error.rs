//! Errors produced while capturing an SSO redirect.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the identity provider through the `error` query
/// parameter of the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    /// OAuth error code, e.g. `access_denied`
    pub error: String,
    /// Human readable detail, if the provider sent one
    pub error_description: Option<String>,
}

impl AuthError {
    /// Creates an error from the redirect's query parameters.
    pub fn new(error: impl Into<String>, error_description: Option<String>) -> Self {
        Self {
            error: error.into(),
            error_description,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => {
                write!(f, "{}: {}", self.error, description)
            }
            _ => f.write_str(&self.error),
        }
    }
}

impl std::error::Error for AuthError {}

/// The redirect carried no `code` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing code")]
pub struct MissingCodeError;

/// The redirect carried no `state` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing state")]
pub struct MissingStateError;

/// The redirect's `state` did not match the expected CSRF token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid state")]
pub struct InvalidStateError;

/// Errors from [`AuthSsoServer`](super::AuthSsoServer).
///
/// Cloneable so one settled result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum SsoError {
    /// The identity provider rejected the login.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A redirect request had no authorization code.
    #[error(transparent)]
    MissingCode(#[from] MissingCodeError),

    /// A redirect request had no CSRF state.
    #[error(transparent)]
    MissingState(#[from] MissingStateError),

    /// A redirect request carried the wrong CSRF state.
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// No redirect arrived in time.
    #[error("timed out after {0:?} waiting for the SSO redirect")]
    Timeout(Duration),

    /// The server was closed before a redirect arrived.
    #[error("SSO login was cancelled")]
    Cancelled,

    /// `start()` was called on a server that is already listening.
    #[error("SSO redirect server already started")]
    AlreadyStarted,

    /// The server has been closed and cannot be started again.
    #[error("SSO redirect server is closed")]
    Closed,

    /// The redirect URI was requested before `start()`.
    #[error("SSO redirect server has not been started")]
    NotStarted,

    /// The loopback listener could not be bound.
    #[error("failed to bind SSO redirect listener: {0}")]
    Bind(#[source] Arc<std::io::Error>),
}

//! Credmux - Credential resolution and caching for AWS tooling.
//!
//! Credmux finds credentials in the places AWS tools look for them, caches
//! what it fetched, and captures the browser redirect of an SSO login. Write
//! your code once against [`CredentialsProvider`] and accept credentials from
//! shared profiles, environment variables or anything else you plug in.
//!
//! # Features
//!
//! - **Shared profiles**: `~/.aws/credentials` and `~/.aws/config`, with
//!   `source_profile` chains, SSO and `credential_process` profiles
//! - **Environment variables**: read live on every fetch
//! - **Caching**: expiration and config-fingerprint aware, with concurrent
//!   fetches for one id collapsed into one
//! - **SSO redirect capture**: loopback listener with CSRF state validation
//! - **Async/Await**: Built on tokio for non-blocking I/O
//!
//! # Quick Start
//!
//! ```no_run
//! use credmux::{Config, CredentialsContext, CredentialsId};
//!
//! #[tokio::main]
//! async fn main() -> credmux::Result<()> {
//!     // Locate the shared files and the environment
//!     let context = CredentialsContext::new(Config::default());
//!
//!     // Build providers from every source
//!     context.refresh_all().await?;
//!
//!     // Fetch once, then serve from cache
//!     let id = CredentialsId::profile("default");
//!     let creds = context.resolve_credentials(&id).await?;
//!     println!("access key: {}", creds.access_key_id);
//!
//!     // Drop the cached entry after the service rejected it
//!     context.invalidate_credentials(&id);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Credential Sources
//!
//! | Source | Id | Provider |
//! |--------|----|----------|
//! | Shared profiles | `profile:<name>` | [`providers::profile::SharedCredentialsProvider`] |
//! | Environment | `env:default` | [`providers::env::EnvVarsCredentialsProvider`] |
//! | Mock | `mock:<name>` | [`providers::mock::MockCredentialsProvider`] (feature `mock`) |
//!
//! # Feature Flags
//!
//! The `mock` feature (default) compiles the in-memory test provider:
//!
//! ```toml
//! [dependencies]
//! credmux = { version = "0.1", default-features = false }
//! ```

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod ini;
pub mod process;
pub mod profile;
pub mod provider;
pub mod providers;
pub mod sso;
pub mod store;

pub use config::{Config, Env};
pub use context::CredentialsContext;
pub use credentials::{CredentialSource, Credentials, CredentialsId};
pub use error::{CredmuxError, Result};
pub use factory::{CredentialsProviderFactory, RefreshOutcome};
pub use provider::{CredentialsProvider, CredentialsProviderChain};
pub use sso::{AuthError, AuthSsoServer, SsoError};
pub use store::CredentialsStore;

//! Shared credentials/config file profiles.
//!
//! Profiles are read from the shared credentials file (`~/.aws/credentials`)
//! and the shared config file (`~/.aws/config`), or from the locations named
//! by `AWS_SHARED_CREDENTIALS_FILE` and `AWS_CONFIG_FILE`.
//!
//! # Supported profile shapes
//!
//! ```ini
//! [default]
//! aws_access_key_id = AKID
//! aws_secret_access_key = SECRET
//! region = us-west-2
//!
//! [profile admin]
//! role_arn = arn:aws:iam::123456789012:role/Admin
//! source_profile = default
//!
//! [profile sso-dev]
//! sso_start_url = https://example.awsapps.com/start
//! sso_region = us-east-1
//! sso_account_id = 123456789012
//! sso_role_name = Developer
//!
//! [profile tool]
//! credential_process = /usr/local/bin/get-creds --json
//! ```
//!
//! Role assumption and SSO role credentials require network calls; supply
//! them through [`RoleAssumer`] and [`SsoCredentialsFetcher`].

mod factory;
mod provider;

pub use factory::SharedCredentialsProviderFactory;
pub use provider::{RoleAssumer, SharedCredentialsProvider, SsoCredentialsFetcher, SsoRoleRequest};

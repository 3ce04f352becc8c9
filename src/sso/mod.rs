//! Loopback redirect capture for browser-based SSO logins.
//!
//! An [`AuthSsoServer`] is created per login attempt. It is started before
//! the browser is sent to the identity provider, hands out the redirect URI
//! to register with the authorization request, and yields the authorization
//! code once the browser is redirected back with a matching CSRF `state`.
//!
//! # Example
//!
//! ```no_run
//! use credmux::sso::AuthSsoServer;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), credmux::SsoError> {
//!     let server = AuthSsoServer::new();
//!     let redirect_uri = server.start().await?;
//!
//!     println!("open the login page with redirect_uri={redirect_uri}&state={}", server.csrf_state());
//!
//!     let code = server
//!         .wait_for_authorization_with_timeout(Duration::from_secs(300))
//!         .await?;
//!     println!("authorization code received ({} bytes)", code.len());
//!     Ok(())
//! }
//! ```

mod error;
mod server;

pub use error::{AuthError, InvalidStateError, MissingCodeError, MissingStateError, SsoError};
pub use server::{AuthSsoServer, SsoServerState};

//! Capture the redirect of a browser-based SSO login.
//!
//! Start the example, then simulate the identity provider redirect:
//!
//!   curl "<redirect uri>?code=example-code&state=<state>"

use credmux::{Config, CredentialsContext, SsoError};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), SsoError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::default()
        .with_sso_redirect_path("/oauth/callback")
        .with_sso_timeout(Duration::from_secs(120));
    let context = CredentialsContext::new(config);

    let server = context.new_sso_server();
    let redirect_uri = server.start().await?;

    println!("Redirect URI: {}", redirect_uri);
    println!("State:        {}", server.csrf_state());
    println!(
        "\nWaiting up to {}s for the redirect...",
        server.timeout().as_secs()
    );

    match server.wait_for_configured_authorization().await {
        Ok(code) => println!("Authorization code: {}", code),
        Err(SsoError::Auth(e)) => println!("Login rejected: {}", e),
        Err(e) => println!("Login failed: {}", e),
    }

    Ok(())
}

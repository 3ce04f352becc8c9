//! Resolve credentials from the environment or the shared profile files.
//!
//! Run with:
//!   RUST_LOG=credmux=debug cargo run --example provider_chain

use credmux::{Config, CredentialsContext, CredentialsProviderFactory};

#[tokio::main]
async fn main() -> credmux::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::default();
    println!("Credentials file: {}", config.credentials_file.display());
    println!("Config file:      {}", config.config_file.display());

    let context = CredentialsContext::new(config);
    let outcomes = context.refresh_all().await?;

    for (factory, outcome) in context.factories().iter().zip(&outcomes) {
        println!("\n[{}]", factory.credential_source());
        for err in &outcome.parse_errors {
            println!("  syntax error: {}", err);
        }
        for err in &outcome.profile_errors {
            println!("  skipped: {}", err);
        }
        for provider in factory.list_providers() {
            let region = provider.get_default_region().unwrap_or_else(|| "-".to_string());
            println!("  {} (region: {})", provider.credentials_id(), region);
        }
    }

    let chain = context.default_chain();
    match chain.resolve(context.store()).await {
        Ok((id, creds)) => println!("\nResolved {} -> {:?}", id, creds),
        Err(e) => println!("\nNo credentials: {}", e),
    }

    Ok(())
}

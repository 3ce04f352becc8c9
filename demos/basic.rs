//! Basic usage example with the mock provider and the credentials store.

use std::sync::Arc;

use credmux::providers::mock::MockCredentialsProvider;
use credmux::{Credentials, CredentialsProvider, CredentialsStore};

#[tokio::main]
async fn main() -> credmux::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let provider = Arc::new(
        MockCredentialsProvider::new("example")
            .with_credentials(Credentials::new("AKIDEXAMPLE", "example-secret"))
            .with_region("us-west-2"),
    );
    let id = provider.credentials_id().clone();
    println!("Provider: {}", id);

    let store = CredentialsStore::new();

    // First call fetches from the provider
    let creds = store.upsert_credentials(&id, provider.clone()).await?;
    println!("Fetched: {:?}", creds);

    // Second call is served from cache
    store.upsert_credentials(&id, provider.clone()).await?;
    println!("Fetches after two upserts: {}", provider.fetch_count());

    // A changed hash code means the backing config changed
    provider.set_hash_code(1);
    store.upsert_credentials(&id, provider.clone()).await?;
    println!("Fetches after config change: {}", provider.fetch_count());

    // Invalidate after a downstream authentication failure
    store.invalidate_credentials(&id);
    println!("Cached after invalidation: {}", store.get_credentials(&id).is_some());

    // Failed fetches surface to the caller and are not cached
    provider.set_fetch_error(Some("network unreachable"));
    match store.upsert_credentials(&id, provider.clone()).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Fetch failed: {}", e),
    }

    Ok(())
}

//! In-memory credentials cache.
//!
//! The [`CredentialsStore`] maps a [`CredentialsId`] to the most recently
//! fetched credentials. Entries are discarded when they expire, when the
//! provider's hash code changes, or when a caller invalidates them. Nothing
//! is ever written to disk.

use crate::{Credentials, CredentialsId, CredentialsProvider, CredmuxError, Result};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

type FetchResult = std::result::Result<Arc<Credentials>, Arc<CredmuxError>>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct StoredCredentials {
    credentials: Arc<Credentials>,
    credentials_hash_code: u64,
}

impl StoredCredentials {
    /// Entries without an expiration stay valid until invalidated.
    fn is_valid(&self) -> bool {
        !self.credentials.is_expired_at(Utc::now())
    }
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<CredentialsId, StoredCredentials>,
    in_flight: HashMap<CredentialsId, InFlight>,
}

/// Process-wide credentials cache with per-id fetch de-duplication.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use credmux::providers::env::EnvVarsCredentialsProvider;
/// use credmux::{CredentialsId, CredentialsStore, Env};
///
/// #[tokio::main]
/// async fn main() -> credmux::Result<()> {
///     let env = Env::from_vars([("AWS_ACCESS_KEY_ID", "AKID"), ("AWS_SECRET_ACCESS_KEY", "SECRET")]);
///     let provider = Arc::new(EnvVarsCredentialsProvider::new(env));
///     let store = CredentialsStore::new();
///
///     let id = CredentialsId::env();
///     let creds = store.upsert_credentials(&id, provider).await?;
///     assert_eq!(creds.access_key_id, "AKID");
///
///     // Served from cache until invalidated.
///     assert!(store.get_credentials(&id).is_some());
///     store.invalidate_credentials(&id);
///     assert!(store.get_credentials(&id).is_none());
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct CredentialsStore {
    state: Arc<Mutex<StoreState>>,
    next_generation: AtomicU64,
}

impl CredentialsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        lock_state(&self.state)
    }

    /// Returns cached credentials if present and not expired.
    ///
    /// Never triggers a fetch. Expired entries are evicted.
    pub fn get_credentials(&self, id: &CredentialsId) -> Option<Arc<Credentials>> {
        let mut state = self.lock();
        match state.entries.get(id) {
            Some(entry) if entry.is_valid() => Some(Arc::clone(&entry.credentials)),
            Some(_) => {
                debug!(%id, "cached credentials expired");
                state.entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Returns cached credentials, fetching them from `provider` when needed.
    ///
    /// The cached entry is reused when it is unexpired and was stored with the
    /// provider's current hash code. Otherwise `provider.get_credentials()` is
    /// called once and the result cached. Concurrent calls for the same id
    /// share one fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CredmuxError::Fetch`] wrapping the provider's error. Failed
    /// fetches are not cached.
    pub async fn upsert_credentials(
        &self,
        id: &CredentialsId,
        provider: Arc<dyn CredentialsProvider>,
    ) -> Result<Arc<Credentials>> {
        let fetch = {
            let mut state = self.lock();

            if let Some(entry) = state.entries.get(id) {
                let hash_code = provider.get_hash_code();
                if entry.is_valid() && entry.credentials_hash_code == hash_code {
                    debug!(%id, "using cached credentials");
                    return Ok(Arc::clone(&entry.credentials));
                }
                debug!(%id, "cached credentials stale, refetching");
            }

            match state.in_flight.get(id) {
                Some(in_flight) => {
                    debug!(%id, "joining in-flight credentials fetch");
                    in_flight.fetch.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let fetch = fetch_and_store(
                        Arc::clone(&self.state),
                        id.clone(),
                        provider,
                        generation,
                    )
                    .boxed()
                    .shared();
                    state.in_flight.insert(
                        id.clone(),
                        InFlight {
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };

        fetch
            .await
            .map_err(|source| CredmuxError::fetch(id.clone(), source))
    }

    /// Removes the cached entry for `id`.
    ///
    /// A fetch already in flight for `id` is detached: its callers still get
    /// its result, but it is not cached and later callers fetch again.
    pub fn invalidate_credentials(&self, id: &CredentialsId) {
        let mut state = self.lock();
        let removed = state.entries.remove(id).is_some();
        state.in_flight.remove(id);
        if removed {
            info!(%id, "invalidated cached credentials");
        }
    }

    /// Number of cached entries, valid or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_state(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn fetch_and_store(
    state: Arc<Mutex<StoreState>>,
    id: CredentialsId,
    provider: Arc<dyn CredentialsProvider>,
    generation: u64,
) -> FetchResult {
    let hash_code = provider.get_hash_code();
    debug!(%id, "fetching credentials");
    let result = provider.get_credentials().await;

    let mut state = lock_state(&state);
    let current = state
        .in_flight
        .get(&id)
        .is_some_and(|in_flight| in_flight.generation == generation);
    if current {
        state.in_flight.remove(&id);
    }

    match result {
        Ok(credentials) => {
            let credentials = Arc::new(credentials);
            if current {
                state.entries.insert(
                    id,
                    StoredCredentials {
                        credentials: Arc::clone(&credentials),
                        credentials_hash_code: hash_code,
                    },
                );
            }
            Ok(credentials)
        }
        Err(err) => {
            debug!(%id, error = %err, "credentials fetch failed");
            Err(Arc::new(err))
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::providers::mock::MockCredentialsProvider;
    use chrono::Duration;

    fn mock(name: &str) -> Arc<MockCredentialsProvider> {
        Arc::new(
            MockCredentialsProvider::new(name).with_credentials(Credentials::new("AKID", "SECRET")),
        )
    }

    #[tokio::test]
    async fn test_upsert_caches_first_fetch() {
        let store = CredentialsStore::new();
        let provider = mock("dev");
        let id = provider.credentials_id().clone();

        let first = store.upsert_credentials(&id, provider.clone()).await.unwrap();
        let second = store.upsert_credentials(&id, provider.clone()).await.unwrap();

        assert_eq!(provider.fetch_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_get_credentials_never_fetches() {
        let store = CredentialsStore::new();
        let provider = mock("dev");
        let id = provider.credentials_id().clone();

        assert!(store.get_credentials(&id).is_none());
        assert_eq!(provider.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_hash_code_change_refetches() {
        let store = CredentialsStore::new();
        let provider = mock("dev");
        let id = provider.credentials_id().clone();

        store.upsert_credentials(&id, provider.clone()).await.unwrap();
        provider.set_hash_code(42);
        store.upsert_credentials(&id, provider.clone()).await.unwrap();

        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_served() {
        let store = CredentialsStore::new();
        let provider = Arc::new(MockCredentialsProvider::new("dev").with_credentials(
            Credentials::new("AKID", "SECRET").with_expiration(Utc::now() - Duration::hours(1)),
        ));
        let id = provider.credentials_id().clone();

        store.upsert_credentials(&id, provider.clone()).await.unwrap();
        assert!(store.get_credentials(&id).is_none());

        store.upsert_credentials(&id, provider.clone()).await.unwrap();
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unexpiring_entry_stays_until_invalidated() {
        let store = CredentialsStore::new();
        let provider = mock("dev");
        let id = provider.credentials_id().clone();

        store.upsert_credentials(&id, provider.clone()).await.unwrap();
        assert!(store.get_credentials(&id).is_some());

        store.invalidate_credentials(&id);
        assert!(store.get_credentials(&id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_share_fetch() {
        let store = CredentialsStore::new();
        let provider = Arc::new(
            MockCredentialsProvider::new("slow")
                .with_credentials(Credentials::new("AKID", "SECRET"))
                .with_delay(std::time::Duration::from_millis(50)),
        );
        let id = provider.credentials_id().clone();

        let (a, b) = tokio::join!(
            store.upsert_credentials(&id, provider.clone()),
            store.upsert_credentials(&id, provider.clone()),
        );

        assert_eq!(provider.fetch_count(), 1);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let store = CredentialsStore::new();
        let provider = mock("flaky");
        let id = provider.credentials_id().clone();

        provider.set_fetch_error(Some("network unreachable"));
        let err = store
            .upsert_credentials(&id, provider.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CredmuxError::Fetch { .. }));
        assert!(store.get_credentials(&id).is_none());

        provider.set_fetch_error(None);
        store.upsert_credentials(&id, provider.clone()).await.unwrap();
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_failures_reach_every_caller() {
        let store = CredentialsStore::new();
        let provider = Arc::new(
            MockCredentialsProvider::new("slow")
                .with_delay(std::time::Duration::from_millis(20)),
        );
        provider.set_fetch_error(Some("boom"));
        let id = provider.credentials_id().clone();

        let (a, b) = tokio::join!(
            store.upsert_credentials(&id, provider.clone()),
            store.upsert_credentials(&id, provider.clone()),
        );

        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(provider.fetch_count(), 1);
    }
}

//! Mock provider for testing.
//!
//! This provider keeps its credentials in memory and supports error injection
//! and artificial latency for testing code that consumes credentials.

use crate::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock credentials provider.
///
/// Counts every call to `get_credentials()` so tests can assert on caching
/// behaviour.
///
/// # Example
///
/// ```
/// use credmux::providers::mock::MockCredentialsProvider;
/// use credmux::{Credentials, CredentialsProvider};
///
/// #[tokio::main]
/// async fn main() -> credmux::Result<()> {
///     let provider = MockCredentialsProvider::new("test")
///         .with_credentials(Credentials::new("AKID", "SECRET"));
///
///     let creds = provider.get_credentials().await?;
///     assert_eq!(creds.access_key_id, "AKID");
///
///     // Test error conditions
///     provider.set_fetch_error(Some("throttled"));
///     assert!(provider.get_credentials().await.is_err());
///     assert_eq!(provider.fetch_count(), 2);
///     Ok(())
/// }
/// ```
pub struct MockCredentialsProvider {
    id: CredentialsId,
    credentials: Mutex<Credentials>,
    region: Option<String>,
    delay: Option<Duration>,
    available: AtomicBool,
    hash_code: AtomicU64,
    fetch_count: AtomicUsize,
    fetch_error: Mutex<Option<String>>,
}

impl MockCredentialsProvider {
    /// Creates a provider named `mock:<name>` with placeholder credentials.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CredentialsId::new(CredentialSource::Mock, name),
            credentials: Mutex::new(Credentials::new("mock-access-key", "mock-secret-key")),
            region: None,
            delay: None,
            available: AtomicBool::new(true),
            hash_code: AtomicU64::new(0),
            fetch_count: AtomicUsize::new(0),
            fetch_error: Mutex::new(None),
        }
    }

    /// Sets the credentials returned by `get_credentials()`.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.set_credentials(credentials);
        self
    }

    /// Sets the default region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Makes every fetch sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the credentials returned by later fetches.
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock().unwrap_or_else(|e| e.into_inner()) = credentials;
    }

    /// Changes the reported hash code.
    pub fn set_hash_code(&self, hash_code: u64) {
        self.hash_code.store(hash_code, Ordering::SeqCst);
    }

    /// Changes the reported availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes later fetches fail with the given message, or succeed with `None`.
    pub fn set_fetch_error(&self, message: Option<&str>) {
        *self.fetch_error.lock().unwrap_or_else(|e| e.into_inner()) =
            message.map(str::to_string);
    }

    /// Number of times `get_credentials()` was called.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialsProvider for MockCredentialsProvider {
    fn credentials_id(&self) -> &CredentialsId {
        &self.id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get_credentials(&self) -> Result<Credentials> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let error = self
            .fetch_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(message) = error {
            return Err(CredmuxError::Other(anyhow::anyhow!("{}", message)));
        }

        Ok(self
            .credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn get_default_region(&self) -> Option<String> {
        self.region.clone()
    }

    fn get_hash_code(&self) -> u64 {
        self.hash_code.load(Ordering::SeqCst)
    }
}

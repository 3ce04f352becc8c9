//! Factory building profile providers from the shared files.

use super::provider::{RoleAssumer, SharedCredentialsProvider, SsoCredentialsFetcher};
use crate::factory::RefreshOutcome;
use crate::ini::{self, Section};
use crate::profile::resolve_profiles;
use crate::{
    Config, CredentialSource, CredentialsId, CredentialsProvider, CredentialsProviderFactory,
    CredmuxError, Result,
};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

type RefreshResult = std::result::Result<Arc<RefreshOutcome>, Arc<CredmuxError>>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Modification times of the backing files; `None` when a file is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamps {
    credentials: Option<SystemTime>,
    config: Option<SystemTime>,
}

#[derive(Default)]
struct FactoryState {
    providers: BTreeMap<CredentialsId, Arc<dyn CredentialsProvider>>,
    stamps: Option<FileStamps>,
    last_outcome: RefreshOutcome,
    in_flight: Option<SharedRefresh>,
}

struct Inner {
    credentials_file: PathBuf,
    config_file: PathBuf,
    role_assumer: Option<Arc<dyn RoleAssumer>>,
    sso_fetcher: Option<Arc<dyn SsoCredentialsFetcher>>,
    state: Mutex<FactoryState>,
    load_count: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Builds one [`SharedCredentialsProvider`] per valid profile.
///
/// `refresh()` skips re-reading when neither file's modification time has
/// changed since the last successful load.
///
/// # Example
///
/// ```no_run
/// use credmux::providers::profile::SharedCredentialsProviderFactory;
/// use credmux::{CredentialsId, CredentialsProviderFactory};
///
/// #[tokio::main]
/// async fn main() -> credmux::Result<()> {
///     let factory = SharedCredentialsProviderFactory::new(
///         "/home/me/.aws/credentials",
///         "/home/me/.aws/config",
///     );
///     factory.refresh().await?;
///
///     if let Some(provider) = factory.get_provider(&CredentialsId::profile("default")) {
///         let creds = provider.get_credentials().await?;
///         println!("using {}", creds.access_key_id);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SharedCredentialsProviderFactory {
    inner: Arc<Inner>,
}

impl SharedCredentialsProviderFactory {
    /// Creates a factory over the given credentials and config files.
    pub fn new(credentials_file: impl Into<PathBuf>, config_file: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials_file: credentials_file.into(),
                config_file: config_file.into(),
                role_assumer: None,
                sso_fetcher: None,
                state: Mutex::new(FactoryState::default()),
                load_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates a factory over the files named by `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.credentials_file, &config.config_file)
    }

    /// Sets the collaborator used by role profiles.
    ///
    /// Takes effect for providers built by later reloads.
    pub fn with_role_assumer(self, assumer: Arc<dyn RoleAssumer>) -> Self {
        self.rebuild_inner(|inner| inner.role_assumer = Some(assumer))
    }

    /// Sets the collaborator used by SSO profiles.
    ///
    /// Takes effect for providers built by later reloads.
    pub fn with_sso_fetcher(self, fetcher: Arc<dyn SsoCredentialsFetcher>) -> Self {
        self.rebuild_inner(|inner| inner.sso_fetcher = Some(fetcher))
    }

    fn rebuild_inner(self, apply: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Inner {
            credentials_file: self.inner.credentials_file.clone(),
            config_file: self.inner.config_file.clone(),
            role_assumer: self.inner.role_assumer.clone(),
            sso_fetcher: self.inner.sso_fetcher.clone(),
            state: Mutex::new(FactoryState::default()),
            load_count: AtomicUsize::new(0),
        };
        apply(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Number of times the backing files were actually read.
    pub fn load_count(&self) -> usize {
        self.inner.load_count.load(Ordering::SeqCst)
    }

    /// The shared credentials file.
    pub fn credentials_file(&self) -> &Path {
        &self.inner.credentials_file
    }

    /// The shared config file.
    pub fn config_file(&self) -> &Path {
        &self.inner.config_file
    }
}

#[async_trait]
impl CredentialsProviderFactory for SharedCredentialsProviderFactory {
    fn credential_source(&self) -> CredentialSource {
        CredentialSource::Profile
    }

    async fn refresh(&self) -> Result<RefreshOutcome> {
        let refresh = {
            let mut state = self.inner.lock();
            match state.in_flight.clone() {
                Some(in_flight) => {
                    debug!("joining in-flight profile refresh");
                    in_flight
                }
                None => {
                    let refresh = run_refresh(Arc::clone(&self.inner)).boxed().shared();
                    state.in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh
            .await
            .map(|outcome| outcome.as_ref().clone())
            .map_err(CredmuxError::Refresh)
    }

    fn list_providers(&self) -> Vec<Arc<dyn CredentialsProvider>> {
        self.inner.lock().providers.values().cloned().collect()
    }

    fn get_provider(&self, id: &CredentialsId) -> Option<Arc<dyn CredentialsProvider>> {
        self.inner.lock().providers.get(id).cloned()
    }
}

async fn run_refresh(inner: Arc<Inner>) -> RefreshResult {
    let result = reload(&inner).await;
    inner.lock().in_flight = None;
    result.map(Arc::new).map_err(Arc::new)
}

async fn reload(inner: &Inner) -> Result<RefreshOutcome> {
    let stamps = FileStamps {
        credentials: modified(&inner.credentials_file).await?,
        config: modified(&inner.config_file).await?,
    };

    {
        let state = inner.lock();
        if state.stamps == Some(stamps) {
            debug!("shared credential files unchanged, skipping reload");
            return Ok(RefreshOutcome {
                reloaded: false,
                ..state.last_outcome.clone()
            });
        }
    }

    inner.load_count.fetch_add(1, Ordering::SeqCst);

    let credentials = read_parsed(&inner.credentials_file).await?;
    let config = read_parsed(&inner.config_file).await?;

    let mut sections: BTreeMap<String, Section> = BTreeMap::new();
    for (name, section) in config.sections {
        if let Some(profile_name) = config_profile_name(&name) {
            sections.entry(profile_name).or_default().extend(section);
        }
    }
    for (name, section) in credentials.sections {
        sections.entry(name).or_default().extend(section);
    }

    let mut parse_errors = credentials.errors;
    parse_errors.extend(config.errors);
    for err in &parse_errors {
        warn!(error = %err, "shared credentials file syntax error");
    }

    let (resolved, profile_errors) = resolve_profiles(&sections);
    for err in &profile_errors {
        debug!(error = %err, "excluding profile");
    }

    let providers: BTreeMap<CredentialsId, Arc<dyn CredentialsProvider>> = resolved
        .into_values()
        .map(|profile| {
            let provider = SharedCredentialsProvider::new(
                profile,
                inner.role_assumer.clone(),
                inner.sso_fetcher.clone(),
            );
            let id = provider.credentials_id().clone();
            (id, Arc::new(provider) as Arc<dyn CredentialsProvider>)
        })
        .collect();

    info!(
        profiles = providers.len(),
        parse_errors = parse_errors.len(),
        excluded = profile_errors.len(),
        "loaded shared credential profiles"
    );

    let outcome = RefreshOutcome {
        reloaded: true,
        parse_errors,
        profile_errors,
    };

    let mut state = inner.lock();
    state.providers = providers;
    state.stamps = Some(stamps);
    state.last_outcome = outcome.clone();

    Ok(outcome)
}

/// Maps a config file section name to a profile name.
///
/// Only `default` and `profile <name>` sections describe profiles; other
/// sections (`sso-session`, `services`, ...) are ignored.
fn config_profile_name(section: &str) -> Option<String> {
    if section == "default" {
        return Some(section.to_string());
    }
    section
        .strip_prefix("profile ")
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

async fn modified(path: &Path) -> Result<Option<SystemTime>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata.modified()?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_parsed(path: &Path) -> Result<ini::ParsedFile> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(ini::parse(path, &contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ini::ParsedFile::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const CREDENTIALS: &str = "\
[default]
aws_access_key_id = AKID
aws_secret_access_key = SECRET

[no-secret]
aws_access_key_id = AKID2

[second]
aws_access_key_id = AKID3
aws_secret_access_key = SECRET3
";

    const CONFIG: &str = "\
[default]
region = us-west-2

[profile admin]
role_arn = arn:aws:iam::123456789012:role/Admin
source_profile = default

[sso-session corp]
sso_start_url = https://example.awsapps.com/start
";

    fn fixture(credentials: &str, config: &str) -> (TempDir, SharedCredentialsProviderFactory) {
        let dir = tempdir().unwrap();
        let credentials_file = dir.path().join("credentials");
        let config_file = dir.path().join("config");
        std::fs::write(&credentials_file, credentials).unwrap();
        std::fs::write(&config_file, config).unwrap();
        let factory = SharedCredentialsProviderFactory::new(credentials_file, config_file);
        (dir, factory)
    }

    fn bump_mtime(path: &Path) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_builds_valid_providers() {
        let (_dir, factory) = fixture(CREDENTIALS, CONFIG);
        let outcome = factory.refresh().await.unwrap();

        assert!(outcome.reloaded);
        assert!(outcome.parse_errors.is_empty());

        let ids: Vec<String> = factory
            .list_providers()
            .iter()
            .map(|p| p.credentials_id().to_string())
            .collect();
        assert_eq!(ids, vec!["profile:admin", "profile:default", "profile:second"]);

        assert!(factory.get_provider(&CredentialsId::profile("no-secret")).is_none());
        assert!(factory.get_provider(&CredentialsId::profile("corp")).is_none());
    }

    #[tokio::test]
    async fn test_config_and_credentials_merge() {
        let (_dir, factory) = fixture(CREDENTIALS, CONFIG);
        factory.refresh().await.unwrap();

        let provider = factory
            .get_provider(&CredentialsId::profile("default"))
            .unwrap();
        assert_eq!(provider.get_default_region().as_deref(), Some("us-west-2"));
    }

    #[tokio::test]
    async fn test_unchanged_files_are_not_reloaded() {
        let (dir, factory) = fixture(CREDENTIALS, CONFIG);

        factory.refresh().await.unwrap();
        let second = factory.refresh().await.unwrap();
        assert!(!second.reloaded);
        assert_eq!(factory.load_count(), 1);

        bump_mtime(&dir.path().join("credentials"));
        let third = factory.refresh().await.unwrap();
        assert!(third.reloaded);
        assert_eq!(factory.load_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_load() {
        let (_dir, factory) = fixture(CREDENTIALS, CONFIG);

        let (a, b) = tokio::join!(factory.refresh(), factory.refresh());

        assert!(a.unwrap().reloaded);
        assert!(b.unwrap().reloaded);
        assert_eq!(factory.load_count(), 1);
    }

    #[tokio::test]
    async fn test_parse_errors_are_reported_not_fatal() {
        let (_dir, factory) = fixture(
            "[default]\naws_access_key_id = AKID\naws_secret_access_key = SECRET\n[broken\n",
            "",
        );
        let outcome = factory.refresh().await.unwrap();

        assert_eq!(outcome.parse_errors.len(), 1);
        assert_eq!(outcome.parse_errors[0].line, 4);
        assert_eq!(factory.list_providers().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_files_yield_no_providers() {
        let dir = tempdir().unwrap();
        let factory = SharedCredentialsProviderFactory::new(
            dir.path().join("missing-credentials"),
            dir.path().join("missing-config"),
        );

        let outcome = factory.refresh().await.unwrap();
        assert!(outcome.parse_errors.is_empty());
        assert!(factory.list_providers().is_empty());
    }

    #[tokio::test]
    async fn test_edit_changes_provider_hash_code() {
        let (dir, factory) = fixture(CREDENTIALS, CONFIG);
        factory.refresh().await.unwrap();
        let id = CredentialsId::profile("default");
        let before = factory.get_provider(&id).unwrap().get_hash_code();

        let credentials_file = dir.path().join("credentials");
        std::fs::write(
            &credentials_file,
            CREDENTIALS.replace("AKID\n", "AKID-ROTATED\n"),
        )
        .unwrap();
        bump_mtime(&credentials_file);
        factory.refresh().await.unwrap();

        let after = factory.get_provider(&id).unwrap().get_hash_code();
        assert_ne!(before, after);
    }

    #[test]
    fn test_config_profile_names() {
        assert_eq!(config_profile_name("default").as_deref(), Some("default"));
        assert_eq!(config_profile_name("profile dev").as_deref(), Some("dev"));
        assert_eq!(config_profile_name("sso-session corp"), None);
        assert_eq!(config_profile_name("profile "), None);
    }
}

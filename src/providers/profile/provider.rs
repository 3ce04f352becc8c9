//! Provider for one resolved shared-file profile.

use crate::profile::{ProfileKind, ResolvedProfile};
use crate::process::run_credential_process;
use crate::{Credentials, CredentialsId, CredentialsProvider, CredmuxError, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Performs `sts:AssumeRole` on behalf of role profiles.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    /// Exchanges `source` credentials for credentials of `role_arn`.
    async fn assume_role(
        &self,
        role_arn: &str,
        source: &Credentials,
        region: Option<&str>,
    ) -> Result<Credentials>;
}

/// Parameters of an SSO role credentials request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoRoleRequest {
    /// Identity center start URL
    pub start_url: String,
    /// Region of the SSO portal
    pub sso_region: String,
    /// Account to obtain credentials for
    pub account_id: String,
    /// Permission set name
    pub role_name: String,
}

/// Obtains role credentials for SSO profiles, typically from a cached token.
#[async_trait]
pub trait SsoCredentialsFetcher: Send + Sync {
    /// Returns credentials for the requested account and role.
    async fn get_role_credentials(&self, request: &SsoRoleRequest) -> Result<Credentials>;
}

/// Credentials for one profile of the shared files.
pub struct SharedCredentialsProvider {
    id: CredentialsId,
    profile: ResolvedProfile,
    hash_code: u64,
    role_assumer: Option<Arc<dyn RoleAssumer>>,
    sso_fetcher: Option<Arc<dyn SsoCredentialsFetcher>>,
}

impl SharedCredentialsProvider {
    pub(crate) fn new(
        profile: ResolvedProfile,
        role_assumer: Option<Arc<dyn RoleAssumer>>,
        sso_fetcher: Option<Arc<dyn SsoCredentialsFetcher>>,
    ) -> Self {
        Self {
            id: CredentialsId::profile(&profile.profile().name),
            hash_code: fingerprint(&profile),
            profile,
            role_assumer,
            sso_fetcher,
        }
    }

    /// The resolved profile chain backing this provider.
    pub fn profile(&self) -> &ResolvedProfile {
        &self.profile
    }

    async fn base_credentials(&self) -> Result<Credentials> {
        let base = self.profile.base();
        match &base.kind {
            ProfileKind::Static {
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                let mut credentials = Credentials::new(access_key_id, secret_access_key);
                credentials.session_token = session_token.clone();
                Ok(credentials)
            }
            ProfileKind::Process { command } => run_credential_process(command).await,
            ProfileKind::Sso {
                start_url,
                sso_region,
                account_id,
                role_name,
            } => {
                let fetcher = self.sso_fetcher.as_ref().ok_or_else(|| {
                    CredmuxError::NotSupported(format!(
                        "profile {} requires an SSO login",
                        base.name
                    ))
                })?;
                fetcher
                    .get_role_credentials(&SsoRoleRequest {
                        start_url: start_url.clone(),
                        sso_region: sso_region.clone(),
                        account_id: account_id.clone(),
                        role_name: role_name.clone(),
                    })
                    .await
            }
            // resolve_profiles never ends a chain on a role profile
            ProfileKind::AssumeRole { .. } => Err(CredmuxError::ProfileNotFound(format!(
                "{} has no base credentials",
                base.name
            ))),
        }
    }
}

#[async_trait]
impl CredentialsProvider for SharedCredentialsProvider {
    fn credentials_id(&self) -> &CredentialsId {
        &self.id
    }

    async fn is_available(&self) -> bool {
        let needs_roles = self.profile.chain().len() > 1;
        if needs_roles && self.role_assumer.is_none() {
            return false;
        }

        match self.profile.base().kind {
            ProfileKind::Sso { .. } => self.sso_fetcher.is_some(),
            _ => true,
        }
    }

    async fn get_credentials(&self) -> Result<Credentials> {
        let mut credentials = self.base_credentials().await?;

        let region = self.get_default_region();
        for role_arn in self.profile.roles_to_assume() {
            let assumer = self.role_assumer.as_ref().ok_or_else(|| {
                CredmuxError::NotSupported(format!(
                    "profile {} requires role assumption",
                    self.profile.profile().name
                ))
            })?;
            debug!(id = %self.id, role_arn, "assuming role");
            credentials = assumer
                .assume_role(role_arn, &credentials, region.as_deref())
                .await?;
        }

        Ok(credentials)
    }

    fn get_default_region(&self) -> Option<String> {
        self.profile.profile().region.clone()
    }

    fn get_hash_code(&self) -> u64 {
        self.hash_code
    }
}

/// Stable within one process; changes whenever any setting along the chain does.
fn fingerprint(profile: &ResolvedProfile) -> u64 {
    let mut hasher = DefaultHasher::new();
    for link in profile.chain() {
        link.name.hash(&mut hasher);
        link.settings.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::Section;
    use crate::profile::resolve_profiles;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn resolve(entries: &[(&str, &[(&str, &str)])]) -> BTreeMap<String, ResolvedProfile> {
        let sections: BTreeMap<String, Section> = entries
            .iter()
            .map(|(name, pairs)| {
                (
                    name.to_string(),
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            })
            .collect();
        resolve_profiles(&sections).0
    }

    /// Records each call and derives the new key from the role name.
    #[derive(Default)]
    struct RecordingAssumer {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RoleAssumer for RecordingAssumer {
        async fn assume_role(
            &self,
            role_arn: &str,
            source: &Credentials,
            _region: Option<&str>,
        ) -> Result<Credentials> {
            self.calls
                .lock()
                .unwrap()
                .push((role_arn.to_string(), source.access_key_id.clone()));
            Ok(Credentials::new(format!("AKID-{}", role_arn), "ROLE-SECRET")
                .with_session_token("ROLE-TOKEN"))
        }
    }

    #[tokio::test]
    async fn test_static_profile_credentials() {
        let resolved = resolve(&[(
            "default",
            &[
                ("aws_access_key_id", "AKID"),
                ("aws_secret_access_key", "SECRET"),
                ("aws_session_token", "TOKEN"),
                ("region", "ap-southeast-2"),
            ],
        )]);
        let provider = SharedCredentialsProvider::new(resolved["default"].clone(), None, None);

        assert!(provider.is_available().await);
        let creds = provider.get_credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.session_token.as_deref(), Some("TOKEN"));
        assert_eq!(provider.get_default_region().as_deref(), Some("ap-southeast-2"));
        assert_eq!(provider.credentials_id().to_string(), "profile:default");
    }

    #[tokio::test]
    async fn test_role_chain_assumes_in_order() {
        let resolved = resolve(&[
            ("base", &[("aws_access_key_id", "AKID"), ("aws_secret_access_key", "SECRET")]),
            ("a", &[("role_arn", "role-a"), ("source_profile", "base")]),
            ("b", &[("role_arn", "role-b"), ("source_profile", "a")]),
        ]);
        let assumer = Arc::new(RecordingAssumer::default());
        let provider =
            SharedCredentialsProvider::new(resolved["b"].clone(), Some(assumer.clone()), None);

        let creds = provider.get_credentials().await.unwrap();

        assert_eq!(creds.access_key_id, "AKID-role-b");
        assert_eq!(
            *assumer.calls.lock().unwrap(),
            vec![
                ("role-a".to_string(), "AKID".to_string()),
                ("role-b".to_string(), "AKID-role-a".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_role_profile_without_assumer() {
        let resolved = resolve(&[
            ("base", &[("aws_access_key_id", "AKID"), ("aws_secret_access_key", "SECRET")]),
            ("role", &[("role_arn", "role-a"), ("source_profile", "base")]),
        ]);
        let provider = SharedCredentialsProvider::new(resolved["role"].clone(), None, None);

        assert!(!provider.is_available().await);
        assert!(matches!(
            provider.get_credentials().await,
            Err(CredmuxError::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_sso_profile_without_fetcher() {
        let resolved = resolve(&[(
            "sso",
            &[
                ("sso_start_url", "https://example.awsapps.com/start"),
                ("sso_region", "us-east-1"),
                ("sso_account_id", "123456789012"),
                ("sso_role_name", "Developer"),
            ],
        )]);
        let provider = SharedCredentialsProvider::new(resolved["sso"].clone(), None, None);

        assert!(!provider.is_available().await);
        assert!(provider.get_credentials().await.is_err());
    }

    #[test]
    fn test_hash_code_tracks_source_profile_changes() {
        let before = resolve(&[
            ("base", &[("aws_access_key_id", "AKID"), ("aws_secret_access_key", "SECRET")]),
            ("role", &[("role_arn", "role-a"), ("source_profile", "base")]),
        ]);
        let after = resolve(&[
            ("base", &[("aws_access_key_id", "AKID2"), ("aws_secret_access_key", "SECRET")]),
            ("role", &[("role_arn", "role-a"), ("source_profile", "base")]),
        ]);

        let unchanged = SharedCredentialsProvider::new(before["role"].clone(), None, None);
        let again = SharedCredentialsProvider::new(before["role"].clone(), None, None);
        let changed = SharedCredentialsProvider::new(after["role"].clone(), None, None);

        assert_eq!(unchanged.get_hash_code(), again.get_hash_code());
        assert_ne!(unchanged.get_hash_code(), changed.get_hash_code());
    }
}

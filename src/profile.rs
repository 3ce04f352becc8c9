//! Profile validation and `source_profile` resolution.
//!
//! Raw sections from the [`ini`](crate::ini) parser are loosely typed string
//! maps. This module promotes each one into either a [`ValidatedProfile`]
//! with a concrete [`ProfileKind`], or an invalid profile with the reasons it
//! was rejected.

use crate::ini::Section;
use std::collections::BTreeMap;
use thiserror::Error;

/// Longest `source_profile` chain that is followed before giving up.
pub const MAX_SOURCE_PROFILE_DEPTH: usize = 16;

pub(crate) const AWS_ACCESS_KEY_ID: &str = "aws_access_key_id";
pub(crate) const AWS_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub(crate) const AWS_SESSION_TOKEN: &str = "aws_session_token";
pub(crate) const REGION: &str = "region";
pub(crate) const ROLE_ARN: &str = "role_arn";
pub(crate) const SOURCE_PROFILE: &str = "source_profile";
pub(crate) const SSO_START_URL: &str = "sso_start_url";
pub(crate) const SSO_REGION: &str = "sso_region";
pub(crate) const SSO_ACCOUNT_ID: &str = "sso_account_id";
pub(crate) const SSO_ROLE_NAME: &str = "sso_role_name";
pub(crate) const CREDENTIAL_PROCESS: &str = "credential_process";

/// Why a profile was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// A field required by the profile's credential pattern is absent.
    #[error("profile {profile}: missing required field {field}")]
    MissingField {
        /// Profile name
        profile: String,
        /// Missing key
        field: &'static str,
    },

    /// The profile carries no recognized credential settings.
    #[error("profile {0}: no credentials configured")]
    NoCredentials(String),

    /// `source_profile` names a profile that does not exist or is invalid.
    #[error("profile {profile}: source profile {source_profile} is missing or invalid")]
    MissingSourceProfile {
        /// Profile name
        profile: String,
        /// Referenced profile
        source_profile: String,
    },

    /// Following `source_profile` leads back to a profile already visited.
    #[error("profile {profile}: source profile cycle {}", .chain.join(" -> "))]
    Cycle {
        /// Profile name
        profile: String,
        /// Visited profiles, ending with the repeated one
        chain: Vec<String>,
    },

    /// The chain is longer than [`MAX_SOURCE_PROFILE_DEPTH`].
    #[error("profile {0}: source profile chain is too long")]
    ChainTooDeep(String),
}

/// How a valid profile obtains credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum ProfileKind {
    /// Long-term or session keys written in the file.
    Static {
        /// Access key id
        access_key_id: String,
        /// Secret access key
        secret_access_key: String,
        /// Session token
        session_token: Option<String>,
    },
    /// Assume `role_arn` using the credentials of `source_profile`.
    AssumeRole {
        /// Role to assume
        role_arn: String,
        /// Profile supplying the credentials for the call
        source_profile: String,
    },
    /// Role credentials obtained through an SSO login.
    Sso {
        /// Identity center start URL
        start_url: String,
        /// Region of the SSO portal
        sso_region: String,
        /// Account to obtain credentials for
        account_id: String,
        /// Permission set name
        role_name: String,
    },
    /// Credentials printed by an external command.
    Process {
        /// Command line to run
        command: String,
    },
}

impl std::fmt::Debug for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .finish_non_exhaustive(),
            Self::AssumeRole {
                role_arn,
                source_profile,
            } => f
                .debug_struct("AssumeRole")
                .field("role_arn", role_arn)
                .field("source_profile", source_profile)
                .finish(),
            Self::Sso {
                start_url,
                account_id,
                role_name,
                ..
            } => f
                .debug_struct("Sso")
                .field("start_url", start_url)
                .field("account_id", account_id)
                .field("role_name", role_name)
                .finish_non_exhaustive(),
            Self::Process { command } => {
                f.debug_struct("Process").field("command", command).finish()
            }
        }
    }
}

/// A profile whose settings match a recognized credential pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidatedProfile {
    /// Profile name
    pub name: String,
    /// How credentials are obtained
    pub kind: ProfileKind,
    /// Default region
    pub region: Option<String>,
    /// Every raw setting of the section
    pub settings: Section,
}

impl std::fmt::Debug for ValidatedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedProfile")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("region", &self.region)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Result of validating one raw section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// Usable profile
    Valid(ValidatedProfile),
    /// Rejected profile
    Invalid {
        /// Profile name
        name: String,
        /// Reasons for rejection
        errors: Vec<ProfileError>,
    },
}

impl Profile {
    /// Validates a raw section.
    ///
    /// Checked in order: `role_arn`, `sso_*`, static keys, `credential_process`.
    ///
    /// ```
    /// use credmux::ini::Section;
    /// use credmux::profile::{Profile, ProfileError};
    ///
    /// let mut section = Section::new();
    /// section.insert("aws_access_key_id".into(), "AKID".into());
    ///
    /// match Profile::from_section("dev", &section) {
    ///     Profile::Invalid { errors, .. } => assert!(matches!(
    ///         errors[0],
    ///         ProfileError::MissingField { field: "aws_secret_access_key", .. }
    ///     )),
    ///     Profile::Valid(_) => unreachable!(),
    /// }
    /// ```
    pub fn from_section(name: &str, section: &Section) -> Self {
        let get = |key: &str| {
            section
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let missing = |field: &'static str| ProfileError::MissingField {
            profile: name.to_string(),
            field,
        };

        let kind = if let Some(role_arn) = get(ROLE_ARN) {
            match get(SOURCE_PROFILE) {
                Some(source_profile) => Ok(ProfileKind::AssumeRole {
                    role_arn,
                    source_profile,
                }),
                None => Err(vec![missing(SOURCE_PROFILE)]),
            }
        } else if [SSO_START_URL, SSO_REGION, SSO_ACCOUNT_ID, SSO_ROLE_NAME]
            .into_iter()
            .any(|key| get(key).is_some())
        {
            match (
                get(SSO_START_URL),
                get(SSO_REGION),
                get(SSO_ACCOUNT_ID),
                get(SSO_ROLE_NAME),
            ) {
                (Some(start_url), Some(sso_region), Some(account_id), Some(role_name)) => {
                    Ok(ProfileKind::Sso {
                        start_url,
                        sso_region,
                        account_id,
                        role_name,
                    })
                }
                _ => Err([SSO_START_URL, SSO_REGION, SSO_ACCOUNT_ID, SSO_ROLE_NAME]
                    .into_iter()
                    .filter(|&key| get(key).is_none())
                    .map(missing)
                    .collect()),
            }
        } else if get(AWS_ACCESS_KEY_ID).is_some() || get(AWS_SECRET_ACCESS_KEY).is_some() {
            match (get(AWS_ACCESS_KEY_ID), get(AWS_SECRET_ACCESS_KEY)) {
                (Some(access_key_id), Some(secret_access_key)) => Ok(ProfileKind::Static {
                    access_key_id,
                    secret_access_key,
                    session_token: get(AWS_SESSION_TOKEN),
                }),
                (None, _) => Err(vec![missing(AWS_ACCESS_KEY_ID)]),
                (_, None) => Err(vec![missing(AWS_SECRET_ACCESS_KEY)]),
            }
        } else if let Some(command) = get(CREDENTIAL_PROCESS) {
            Ok(ProfileKind::Process { command })
        } else {
            Err(vec![ProfileError::NoCredentials(name.to_string())])
        };

        match kind {
            Ok(kind) => Self::Valid(ValidatedProfile {
                name: name.to_string(),
                kind,
                region: get(REGION),
                settings: section.clone(),
            }),
            Err(errors) => Self::Invalid {
                name: name.to_string(),
                errors,
            },
        }
    }
}

/// A valid profile together with the profiles it draws credentials from.
///
/// Only produced by [`resolve_profiles`], so the chain is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    chain: Vec<ValidatedProfile>,
}

impl ResolvedProfile {
    /// The profile itself first, then each `source_profile` in turn; the
    /// last entry is never [`ProfileKind::AssumeRole`].
    pub fn chain(&self) -> &[ValidatedProfile] {
        &self.chain
    }

    /// The profile this resolution was made for.
    pub fn profile(&self) -> &ValidatedProfile {
        &self.chain[0]
    }

    /// The profile at the end of the chain that supplies base credentials.
    pub fn base(&self) -> &ValidatedProfile {
        &self.chain[self.chain.len() - 1]
    }

    /// Roles to assume, starting from the one closest to the base profile.
    pub fn roles_to_assume(&self) -> impl Iterator<Item = &str> {
        self.chain.iter().rev().filter_map(|p| match &p.kind {
            ProfileKind::AssumeRole { role_arn, .. } => Some(role_arn.as_str()),
            _ => None,
        })
    }
}

/// Validates every section and resolves `source_profile` chains.
///
/// Returns the profiles that resolved successfully, keyed by name, and the
/// diagnostics for every profile that did not. A profile whose chain loops
/// back on itself, exceeds [`MAX_SOURCE_PROFILE_DEPTH`], or reaches a
/// missing or invalid profile is excluded.
pub fn resolve_profiles(
    sections: &BTreeMap<String, Section>,
) -> (BTreeMap<String, ResolvedProfile>, Vec<ProfileError>) {
    let mut valid = BTreeMap::new();
    let mut errors = Vec::new();

    for (name, section) in sections {
        match Profile::from_section(name, section) {
            Profile::Valid(profile) => {
                valid.insert(name.clone(), profile);
            }
            Profile::Invalid {
                errors: profile_errors,
                ..
            } => errors.extend(profile_errors),
        }
    }

    let mut resolved = BTreeMap::new();
    for name in valid.keys() {
        match resolve_chain(name, &valid) {
            Ok(chain) => {
                resolved.insert(name.clone(), ResolvedProfile { chain });
            }
            Err(err) => errors.push(err),
        }
    }

    (resolved, errors)
}

fn resolve_chain(
    name: &str,
    valid: &BTreeMap<String, ValidatedProfile>,
) -> std::result::Result<Vec<ValidatedProfile>, ProfileError> {
    let mut chain: Vec<ValidatedProfile> = Vec::new();
    let mut current = name;

    loop {
        if chain.iter().any(|p| p.name == current) {
            let mut names: Vec<String> = chain.iter().map(|p| p.name.clone()).collect();
            names.push(current.to_string());
            return Err(ProfileError::Cycle {
                profile: name.to_string(),
                chain: names,
            });
        }
        if chain.len() > MAX_SOURCE_PROFILE_DEPTH {
            return Err(ProfileError::ChainTooDeep(name.to_string()));
        }

        let profile = valid
            .get(current)
            .ok_or_else(|| ProfileError::MissingSourceProfile {
                profile: name.to_string(),
                source_profile: current.to_string(),
            })?;
        chain.push(profile.clone());

        match &profile.kind {
            ProfileKind::AssumeRole { source_profile, .. } => current = source_profile,
            _ => return Ok(chain),
        }
    }
}

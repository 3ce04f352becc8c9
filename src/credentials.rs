//! Credential identifiers and credential material.

use crate::{CredmuxError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Where a set of credentials comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// A named profile from the shared credentials/config files
    Profile,
    /// Process environment variables
    Env,
    /// An SSO login
    Sso,
    /// In-memory test provider
    Mock,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => write!(f, "profile"),
            Self::Env => write!(f, "env"),
            Self::Sso => write!(f, "sso"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for CredentialSource {
    type Err = CredmuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "profile" => Ok(Self::Profile),
            "env" => Ok(Self::Env),
            "sso" => Ok(Self::Sso),
            "mock" => Ok(Self::Mock),
            other => Err(CredmuxError::InvalidCredentialsId(format!(
                "unknown credential source '{}'",
                other
            ))),
        }
    }
}

/// Stable key naming exactly one credentials provider.
///
/// Renders as `<source>:<type id>`, for example `profile:default`.
///
/// ```
/// use credmux::{CredentialsId, CredentialSource};
///
/// let id = CredentialsId::profile("dev");
/// assert_eq!(id.to_string(), "profile:dev");
///
/// let parsed: CredentialsId = "profile:dev".parse().unwrap();
/// assert_eq!(parsed, id);
/// assert_eq!(parsed.credential_source, CredentialSource::Profile);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialsId {
    /// Source kind
    pub credential_source: CredentialSource,
    /// Source-specific name (profile name, SSO session, ...)
    pub credential_type_id: String,
}

impl CredentialsId {
    /// Creates an identifier from its parts.
    pub fn new(credential_source: CredentialSource, credential_type_id: impl Into<String>) -> Self {
        Self {
            credential_source,
            credential_type_id: credential_type_id.into(),
        }
    }

    /// Identifier for a shared-file profile.
    pub fn profile(name: impl Into<String>) -> Self {
        Self::new(CredentialSource::Profile, name)
    }

    /// Identifier for the environment variable provider.
    pub fn env() -> Self {
        Self::new(CredentialSource::Env, "default")
    }
}

impl fmt::Display for CredentialsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.credential_source, self.credential_type_id)
    }
}

impl FromStr for CredentialsId {
    type Err = CredmuxError;

    fn from_str(s: &str) -> Result<Self> {
        let (source, type_id) = s
            .split_once(':')
            .ok_or_else(|| CredmuxError::InvalidCredentialsId(s.to_string()))?;

        if type_id.is_empty() {
            return Err(CredmuxError::InvalidCredentialsId(s.to_string()));
        }

        Ok(Self::new(source.parse()?, type_id))
    }
}

impl Serialize for CredentialsId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CredentialsId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// AWS credential material.
///
/// `Debug` output never includes the secret key or session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Access key id
    pub access_key_id: String,

    /// Secret access key
    pub secret_access_key: String,

    /// Session token for temporary credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// When the credentials stop being valid; `None` means never
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Creates long-term credentials from an access key pair.
    ///
    /// ```
    /// use credmux::Credentials;
    ///
    /// let creds = Credentials::new("AKID", "SECRET");
    /// assert!(creds.session_token.is_none());
    /// assert!(!creds.is_expired());
    /// ```
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    /// Sets the session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Sets the expiration time.
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// True once `now` has reached the expiration time.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiration {
            Some(expiration) => now >= expiration,
            None => false,
        }
    }

    /// True once the current time has reached the expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_credentials_id_display_and_parse() {
        let id = CredentialsId::new(CredentialSource::Sso, "my-start-url");
        assert_eq!(id.to_string(), "sso:my-start-url");
        assert_eq!("sso:my-start-url".parse::<CredentialsId>().unwrap(), id);
    }

    #[test]
    fn test_credentials_id_keeps_colons_in_type_id() {
        let id: CredentialsId = "profile:team:admin".parse().unwrap();
        assert_eq!(id.credential_type_id, "team:admin");
    }

    #[test]
    fn test_credentials_id_rejects_garbage() {
        assert!("default".parse::<CredentialsId>().is_err());
        assert!("profile:".parse::<CredentialsId>().is_err());
        assert!("keychain:default".parse::<CredentialsId>().is_err());
    }

    #[test]
    fn test_credentials_id_serializes_as_string() {
        let json = serde_json::to_string(&CredentialsId::env()).unwrap();
        assert_eq!(json, "\"env:default\"");
    }

    #[test]
    fn test_expiration_is_strict() {
        let now = Utc::now();
        let creds = Credentials::new("AKID", "SECRET").with_expiration(now);

        assert!(creds.is_expired_at(now));
        assert!(!creds.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_no_expiration_never_expires() {
        let creds = Credentials::new("AKID", "SECRET");
        assert!(!creds.is_expired_at(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("AKID", "SECRET").with_session_token("TOKEN");
        let rendered = format!("{:?}", creds);

        assert!(rendered.contains("AKID"));
        assert!(!rendered.contains("SECRET"));
        assert!(!rendered.contains("TOKEN"));
    }
}

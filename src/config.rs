//! Configuration types for locating credential sources.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Environment variable naming the shared credentials file.
pub const AWS_SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
/// Environment variable naming the shared config file.
pub const AWS_CONFIG_FILE: &str = "AWS_CONFIG_FILE";

/// Read access to environment variables.
///
/// Providers read through this type instead of `std::env` so tests can use
/// an isolated in-memory environment. Lookups always observe the current
/// state; nothing is captured at construction.
///
/// ```
/// use credmux::Env;
///
/// let env = Env::from_vars([("AWS_REGION", "us-west-2")]);
/// assert_eq!(env.get("AWS_REGION").as_deref(), Some("us-west-2"));
///
/// env.remove("AWS_REGION");
/// assert!(env.get("AWS_REGION").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Env(EnvInner);

#[derive(Clone, Default)]
enum EnvInner {
    #[default]
    Real,
    Fake(Arc<RwLock<HashMap<String, String>>>),
}

// Values are never printed; they hold secrets.
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            EnvInner::Real => f.write_str("Env::Real"),
            EnvInner::Fake(vars) => {
                let vars = vars.read().unwrap_or_else(|e| e.into_inner());
                let mut keys: Vec<&String> = vars.keys().collect();
                keys.sort();
                f.debug_tuple("Env::Fake").field(&keys).finish()
            }
        }
    }
}

impl Env {
    /// The real process environment.
    pub fn real() -> Self {
        Self(EnvInner::Real)
    }

    /// An in-memory environment seeded with `vars`.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(EnvInner::Fake(Arc::new(RwLock::new(vars))))
    }

    /// Returns the value of `key`, treating empty values as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match &self.0 {
            EnvInner::Real => std::env::var(key).ok(),
            EnvInner::Fake(vars) => vars
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(key)
                .cloned(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Sets a variable in an in-memory environment.
    ///
    /// Has no effect on the real process environment.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let EnvInner::Fake(vars) = &self.0 {
            vars.write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.into(), value.into());
        }
    }

    /// Removes a variable from an in-memory environment.
    ///
    /// Has no effect on the real process environment.
    pub fn remove(&self, key: &str) {
        if let EnvInner::Fake(vars) = &self.0 {
            vars.write().unwrap_or_else(|e| e.into_inner()).remove(key);
        }
    }
}

/// Configuration for credential resolution.
///
/// Use the builder pattern for ergonomic configuration:
///
/// ```no_run
/// use credmux::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_credentials_file("/tmp/aws/credentials")
///     .with_config_file("/tmp/aws/config")
///     .with_sso_redirect_path("/oauth/callback")
///     .with_sso_timeout(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared credentials file (default: `~/.aws/credentials`)
    pub credentials_file: PathBuf,

    /// Shared config file (default: `~/.aws/config`)
    pub config_file: PathBuf,

    /// Environment read by providers
    pub env: Env,

    /// Path component of the SSO redirect URI (default: `/`)
    pub sso_redirect_path: String,

    /// How long to wait for the SSO redirect (default: 5 minutes)
    pub sso_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env(Env::real())
    }
}

impl Config {
    /// Resolves file locations from `env`.
    ///
    /// `AWS_SHARED_CREDENTIALS_FILE` and `AWS_CONFIG_FILE` take precedence
    /// over the default locations under `~/.aws`.
    ///
    /// ```
    /// use credmux::{Config, Env};
    /// use std::path::Path;
    ///
    /// let env = Env::from_vars([("AWS_CONFIG_FILE", "/etc/aws/config")]);
    /// let config = Config::from_env(env);
    /// assert_eq!(config.config_file, Path::new("/etc/aws/config"));
    /// assert!(config.credentials_file.ends_with(".aws/credentials"));
    /// ```
    pub fn from_env(env: Env) -> Self {
        let credentials_file = env
            .get(AWS_SHARED_CREDENTIALS_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_aws_dir().join("credentials"));
        let config_file = env
            .get(AWS_CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_aws_dir().join("config"));

        Self {
            credentials_file,
            config_file,
            env,
            sso_redirect_path: "/".to_string(),
            sso_timeout: Duration::from_secs(300), // 5 minutes
        }
    }

    /// Sets the shared credentials file location.
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = path.into();
        self
    }

    /// Sets the shared config file location.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    /// Sets the environment providers read from.
    ///
    /// File locations already resolved are kept.
    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    /// Sets the path the SSO server listens on.
    pub fn with_sso_redirect_path(mut self, path: impl Into<String>) -> Self {
        self.sso_redirect_path = path.into();
        self
    }

    /// Sets how long SSO logins wait for the browser redirect.
    pub fn with_sso_timeout(mut self, timeout: Duration) -> Self {
        self.sso_timeout = timeout;
        self
    }
}

fn default_aws_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".aws")
}

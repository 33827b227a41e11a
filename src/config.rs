//! Client configuration.
//!
//! Configuration is resolved in layers: built-in defaults, then an optional YAML file, then the
//! `CLASSIFIEDS_API_URL` environment variable, then command-line arguments.

use std::path::Path;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// API root used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
/// Environment variable that overrides the API root.
pub const API_URL_ENV: &str = "CLASSIFIEDS_API_URL";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Endpoint that renews an expired session.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refreshToken";

/// Command-line arguments shared by the classifieds tools.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ClientArgs {
    /// API root URL.
    #[arrrg(optional, "API root URL (default: http://localhost:8080)", "URL")]
    pub api_url: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "FILE")]
    pub config: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 30)", "SECONDS")]
    pub timeout: Option<u64>,

    /// Account email to sign in with.
    #[arrrg(optional, "Sign in with this email before running the command", "EMAIL")]
    pub email: Option<String>,

    /// Account password to sign in with.
    #[arrrg(optional, "Password for --email", "PASSWORD")]
    pub password: Option<String>,

    /// Log refresh activity to stderr.
    #[arrrg(flag, "Log session and refresh activity to stderr")]
    pub verbose: bool,
}

/// How the client treats authentication failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Path of the refresh endpoint.
    pub refresh_path: String,
    /// Statuses that mean "the session is no longer accepted".
    pub auth_failure_statuses: Vec<u16>,
    /// Expire the local session when a request is rejected again after a successful refresh.
    pub expire_on_replay_rejection: bool,
}

impl SessionPolicy {
    /// True if `status` should trigger session recovery.
    pub fn is_auth_failure(&self, status: u16) -> bool {
        self.auth_failure_statuses.contains(&status)
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            auth_failure_statuses: vec![401, 403],
            expire_on_replay_rejection: true,
        }
    }
}

/// Everything needed to build a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root URL.
    pub api_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Session recovery policy.
    pub session: SessionPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            session: SessionPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, with the API root taken from the environment when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a YAML document.  Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("could not read config {}: {e}", path.display()), e)
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Resolve the full layering for command-line tools.
    pub fn from_args(args: &ClientArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        if let Some(api_url) = &args.api_url {
            config.api_url = api_url.clone();
        }
        if let Some(timeout) = args.timeout {
            config.timeout_secs = timeout;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the API root.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the session recovery policy.
    pub fn with_session_policy(mut self, session: SessionPolicy) -> Self {
        self.session = session;
        self
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that the configuration can produce a working client.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_url)?;
        if self.timeout_secs == 0 {
            return Err(Error::validation(
                "timeout must be at least one second",
                Some("timeout_secs".to_string()),
            ));
        }
        if !self.session.refresh_path.starts_with('/') {
            return Err(Error::validation(
                format!(
                    "refresh path {:?} must start with '/'",
                    self.session.refresh_path
                ),
                Some("session.refresh_path".to_string()),
            ));
        }
        if self.session.auth_failure_statuses.is_empty()
            || self
                .session
                .auth_failure_statuses
                .iter()
                .any(|s| !(400..500).contains(s))
        {
            return Err(Error::validation(
                "auth failure statuses must be a non-empty list of 4xx codes",
                Some("session.auth_failure_statuses".to_string()),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(api_url) = std::env::var(API_URL_ENV) {
            if !api_url.trim().is_empty() {
                self.api_url = api_url;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert!(config.session.is_auth_failure(401));
        assert!(config.session.is_auth_failure(403));
        assert!(!config.session.is_auth_failure(404));
        assert!(config.session.expire_on_replay_rejection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_yaml_str(
            "api_url: https://api.example.com\nsession:\n  auth_failure_statuses: [401]\n",
        )
        .unwrap();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.session.auth_failure_statuses, vec![401]);
        assert_eq!(config.session.refresh_path, DEFAULT_REFRESH_PATH);
    }

    #[test]
    fn invalid_yaml_values() {
        assert!(ClientConfig::from_yaml_str("api_url: nope").is_err());
        assert!(ClientConfig::from_yaml_str("timeout_secs: 0").is_err());
        assert!(ClientConfig::from_yaml_str("session:\n  auth_failure_statuses: [500]\n").is_err());
        assert!(ClientConfig::from_yaml_str("session:\n  refresh_path: auth/refresh\n").is_err());
    }

    #[test]
    fn args_override_defaults() {
        let args = ClientArgs {
            api_url: Some("https://staging.example.com".to_string()),
            timeout: Some(5),
            ..ClientArgs::default()
        };
        let config = ClientConfig::from_args(&args).unwrap();
        assert_eq!(config.api_url, "https://staging.example.com");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn missing_config_file() {
        let args = ClientArgs {
            config: Some("/nonexistent/classifieds.yaml".to_string()),
            ..ClientArgs::default()
        };
        let err = ClientConfig::from_args(&args).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}

//! Configuration types for Stubo

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Result, StuboError};

/// Default stub server location
pub const DEFAULT_HOST: &str = "localhost:8001";

/// Path prefix of the v1 REST API
pub const API_VERSION_V1: &str = "stubo/api";

/// Environment variable overriding the stub server location
pub const ENV_HOST: &str = "STUBO_DC";

/// Environment variable holding the basic-auth user
pub const ENV_USER: &str = "STUBO_USER";

/// Environment variable holding the basic-auth password
pub const ENV_PASSWORD: &str = "STUBO_PASSWORD";

/// Operating mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Record mode: real traffic is executed and captured
    Record,
    /// Playback mode: traffic is answered by the stub server
    Playback,
}

impl Mode {
    /// Wire name used by the stub server
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Playback => "playback",
        }
    }

    /// Check if mode is Record
    #[must_use]
    pub fn is_record(self) -> bool {
        matches!(self, Mode::Record)
    }

    /// Check if mode is Playback
    #[must_use]
    pub fn is_playback(self) -> bool {
        matches!(self, Mode::Playback)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = StuboError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "record" => Ok(Mode::Record),
            "playback" | "play" => Ok(Mode::Playback),
            other => Err(StuboError::ConfigError(format!("Unknown mode: {other}"))),
        }
    }
}

/// Basic-auth credentials attached to every call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

impl BasicAuth {
    /// Create credentials from a user/password pair
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value for these credentials
    #[must_use]
    pub fn header_value(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings for the stub server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Stub server `host[:port]`
    #[serde(default = "default_host")]
    pub host: String,
    /// API path prefix
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Use `https` instead of `http`
    #[serde(default)]
    pub ssl: bool,
    /// Optional basic-auth credentials
    #[serde(default)]
    pub auth: Option<BasicAuth>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_api_version() -> String {
    API_VERSION_V1.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_version: default_api_version(),
            ssl: false,
            auth: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given server location
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Attach basic-auth credentials
    #[must_use]
    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Enable or disable TLS
    #[must_use]
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// URL scheme implied by the TLS setting
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Apply `STUBO_DC`, `STUBO_USER` and `STUBO_PASSWORD` overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let (Some(user), Some(password)) = (lookup(ENV_USER), lookup(ENV_PASSWORD)) {
            if !user.is_empty() && !password.is_empty() {
                self.auth = Some(BasicAuth::new(user, password));
            }
        }
    }
}

/// Settings for one recording/playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Scenario the stubs belong to
    pub scenario: String,
    /// Session name
    pub session: String,
    /// Pinned mode; discovered from the server when absent
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Delete the scenario's stubs before recording
    #[serde(default = "default_true")]
    pub delete_stubs: bool,
    /// Force the stub deletion
    #[serde(default)]
    pub delete_stubs_force: bool,
    /// Extension module descriptor attached to every recorded stub
    #[serde(default)]
    pub module: Option<serde_json::Value>,
}

impl SessionConfig {
    /// Create a session configuration with default flags
    pub fn new(scenario: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            session: session.into(),
            mode: None,
            delete_stubs: true,
            delete_stubs_force: false,
            module: None,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Stub server connection
    #[serde(default)]
    pub client: ClientConfig,
    /// Optional session settings
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StuboError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be parsed or is invalid
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StuboError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.client.host.is_empty() {
            return Err(StuboError::ConfigError(
                "client.host cannot be empty".to_string(),
            ));
        }

        if self.client.host.contains('/') {
            return Err(StuboError::ConfigError(format!(
                "client.host must be host[:port], got {}",
                self.client.host
            )));
        }

        if let Some(session) = &self.session {
            if session.scenario.is_empty() {
                return Err(StuboError::ConfigError(
                    "session.scenario cannot be empty".to_string(),
                ));
            }
            if session.session.is_empty() {
                return Err(StuboError::ConfigError(
                    "session.session cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

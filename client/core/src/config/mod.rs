//! Client Configuration
//!
//! Loads the client configuration from `~/.config/docchat/client.toml`,
//! environment variables and command-line overrides.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`DOCCHAT_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8000"
//! connect_timeout_ms = 5000
//! request_timeout_ms = 300000
//!
//! [chat]
//! project = "thesis"
//! debug = false
//! dedup_window_ms = 2000
//!
//! [download]
//! cleanup_wait_ms = 3000
//!
//! [polling]
//! status_interval_secs = 30
//! memory_interval_secs = 10
//! chats_interval_secs = 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// File that failed
        path: PathBuf,
        /// I/O error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Backend connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Backend base URL
    pub base_url: String,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Total timeout for non-streaming requests; streams have none
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout_ms: 5000,
            request_timeout_ms: 300_000,
        }
    }
}

/// Chat settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Project whose documents give context
    pub project: String,
    /// Request retrieval diagnostics with each answer
    pub debug: bool,
    /// Window within which an identical message is a duplicate
    pub dedup_window_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            project: "default".to_string(),
            debug: false,
            dedup_window_ms: 2000,
        }
    }
}

impl ChatConfig {
    /// Dedup window as a duration
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

/// Download settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Bound on waiting for abort and cleanup after a cancel
    pub cleanup_wait_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            cleanup_wait_ms: 3000,
        }
    }
}

impl DownloadConfig {
    /// Cleanup wait as a duration
    #[must_use]
    pub fn cleanup_wait(&self) -> Duration {
        Duration::from_millis(self.cleanup_wait_ms)
    }
}

/// Background refresh intervals
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingConfig {
    /// Backend status refresh
    pub status_interval: Duration,
    /// Memory usage refresh
    pub memory_interval: Duration,
    /// Chat list refresh
    pub chats_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(30),
            memory_interval: Duration::from_secs(10),
            chats_interval: Duration::from_secs(60),
        }
    }
}

/// Effective client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend connection
    pub server: ServerConfig,
    /// Chat behavior
    pub chat: ChatConfig,
    /// Download behavior
    pub download: DownloadConfig,
    /// Background refresh
    pub polling: PollingConfig,
    /// File the configuration came from, if one was read
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chat: ChatConfig::default(),
            download: DownloadConfig::default(),
            polling: PollingConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would make the client unusable
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.server.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "server.base_url must start with http:// or https://, got {url:?}"
            )));
        }

        let intervals = [
            ("polling.status_interval_secs", self.polling.status_interval),
            ("polling.memory_interval_secs", self.polling.memory_interval),
            ("polling.chats_interval_secs", self.polling.chats_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(ConfigError::ValidationError(format!("{name} must be non-zero")));
            }
        }

        Ok(())
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Backend base URL
    pub base_url: Option<String>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Non-streaming request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Default project
    pub project: Option<String>,
    /// Request retrieval diagnostics
    pub debug: Option<bool>,
    /// Duplicate-message window in milliseconds
    pub dedup_window_ms: Option<u64>,
}

/// `[download]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadToml {
    /// Cancellation wait in milliseconds
    pub cleanup_wait_ms: Option<u64>,
}

/// `[polling]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingToml {
    /// Status refresh interval in seconds
    pub status_interval_secs: Option<u64>,
    /// Memory refresh interval in seconds
    pub memory_interval_secs: Option<u64>,
    /// Chat list refresh interval in seconds
    pub chats_interval_secs: Option<u64>,
}

/// Whole `client.toml` file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server section
    pub server: ServerToml,
    /// Chat section
    pub chat: ChatToml,
    /// Download section
    pub download: DownloadToml,
    /// Polling section
    pub polling: PollingToml,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// `$XDG_CONFIG_HOME/docchat/client.toml`
///
/// Returns `$XDG_CONFIG_HOME/docchat/client.toml` or the platform
/// equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("docchat").join("client.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.server.base_url {
        config.server.base_url.clone_from(url);
    }
    if let Some(ms) = toml.server.connect_timeout_ms {
        config.server.connect_timeout_ms = ms;
    }
    if let Some(ms) = toml.server.request_timeout_ms {
        config.server.request_timeout_ms = ms;
    }

    if let Some(ref project) = toml.chat.project {
        config.chat.project.clone_from(project);
    }
    if let Some(debug) = toml.chat.debug {
        config.chat.debug = debug;
    }
    if let Some(ms) = toml.chat.dedup_window_ms {
        config.chat.dedup_window_ms = ms;
    }

    if let Some(ms) = toml.download.cleanup_wait_ms {
        config.download.cleanup_wait_ms = ms;
    }

    if let Some(secs) = toml.polling.status_interval_secs {
        config.polling.status_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.polling.memory_interval_secs {
        config.polling.memory_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.polling.chats_interval_secs {
        config.polling.chats_interval = Duration::from_secs(secs);
    }
}

/// Apply `DOCCHAT_*` overrides read through `lookup`
fn apply_env_config(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    let parse_ms = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(url) = lookup("DOCCHAT_BASE_URL") {
        config.server.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_ms("DOCCHAT_CONNECT_TIMEOUT") {
        config.server.connect_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_ms("DOCCHAT_REQUEST_TIMEOUT") {
        config.server.request_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(project) = lookup("DOCCHAT_PROJECT") {
        config.chat.project = project;
        config.source = ConfigSource::Env;
    }
    if let Some(debug) = lookup("DOCCHAT_DEBUG") {
        config.chat.debug = debug != "0" && debug.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_ms("DOCCHAT_DEDUP_WINDOW_MS") {
        config.chat.dedup_window_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_ms("DOCCHAT_CLEANUP_WAIT_MS") {
        config.download.cleanup_wait_ms = ms;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,
    /// Project override
    pub project: Option<String>,
    /// Debug override
    pub debug: Option<bool>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set project override
    #[must_use]
    pub fn with_project(mut self, project: String) -> Self {
        self.project = Some(project);
        self
    }

    /// Set debug override
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.base_url.is_some() || self.project.is_some() || self.debug.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref url) = self.base_url {
            config.server.base_url.clone_from(url);
        }
        if let Some(ref project) = self.project {
            config.chat.project.clone_from(project);
        }
        if let Some(debug) = self.debug {
            config.chat.debug = debug;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

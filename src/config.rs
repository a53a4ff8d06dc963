//! Configuration management for the StageRunner client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::data::{ConfigId, EditionId};

/// Environment variable selecting the backend host
pub const API_URL_ENV: &str = "STAGERUNNER_API_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Control state polling
    #[serde(default)]
    pub poll: PollConfig,

    /// Beamer viewer defaults
    #[serde(default)]
    pub viewer: ViewerConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the party backend, e.g. `https://party.example.org`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request (required for commands)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Viewer polling interval (ms), 0 disables periodic polling
    #[serde(default = "default_viewer_interval")]
    pub viewer_interval_ms: u64,

    /// Console polling interval (ms), 0 disables periodic polling
    #[serde(default = "default_console_interval")]
    pub console_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Configuration to show when none is given on the command line
    #[serde(default)]
    pub config_id: Option<ConfigId>,

    /// Edition whose configuration to show (used when `config_id` is unset)
    #[serde(default)]
    pub edition_id: Option<EditionId>,

    /// Whether production slides may auto-advance locally
    #[serde(default = "default_true")]
    pub auto_advance: bool,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_viewer_interval() -> u64 {
    5000
}

fn default_console_interval() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            viewer_interval_ms: default_viewer_interval(),
            console_interval_ms: default_console_interval(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            config_id: None,
            edition_id: None,
            auto_advance: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            poll: PollConfig::default(),
            viewer: ViewerConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default,
    /// then apply the base URL environment override
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            config
        } else {
            // Create default config
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            config
        };

        config.apply_base_url_override(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "stagerunner", "stagerunner")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Replace the base URL when the environment provides a non-empty one
    pub fn apply_base_url_override(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
    }

    /// Viewer polling interval, `None` when periodic polling is disabled
    pub fn viewer_poll_interval(&self) -> Option<Duration> {
        interval_from_ms(self.poll.viewer_interval_ms)
    }

    /// Console polling interval, `None` when periodic polling is disabled
    pub fn console_poll_interval(&self) -> Option<Duration> {
        interval_from_ms(self.poll.console_interval_ms)
    }
}

fn interval_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

//! Configuration management for questbank
//!
//! Holds the site base URL, where the question snapshot lives and which
//! credentials to use. Stored as JSON in the platform config directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Default site the client talks to
pub const DEFAULT_BASE_URL: &str = "https://leetcode.com";

/// Errors that can occur while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform config directory could be determined
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the config file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Credential options
///
/// Empty strings mean "not set". When several are set, the browser option
/// wins over the session cookies, which win over username/password.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Comma-separated browser identifiers to read cookies from (e.g. "chrome,firefox")
    pub read_from_browser: String,
    /// Value of the `LEETCODE_SESSION` cookie
    pub session: String,
    /// Value of the `csrftoken` cookie
    pub csrf_token: String,
    /// Account name for password login
    pub username: String,
    /// Account password for password login
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the question bank site
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Snapshot file location; defaults to `<config dir>/cache/leetcode-questions.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
    /// Credential options
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            cache_file: None,
            credentials: CredentialsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Gets the config directory path (cross-platform)
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("questbank"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/questbank"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("questbank"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }

    /// Gets the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Loads configuration from the default location
    ///
    /// A missing file yields the defaults; a malformed one is an error so that
    /// credentials are never silently dropped.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Saves configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Saves configuration to an explicit path, creating parent directories
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolves the question snapshot path
    pub fn cache_file(&self) -> PathBuf {
        if let Some(path) = &self.cache_file {
            return path.clone();
        }
        Self::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cache")
            .join("leetcode-questions.json")
    }
}

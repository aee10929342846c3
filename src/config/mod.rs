//! Configuration management for selin-mcp
//!
//! Handles loading and validating configuration from TOML files, with
//! environment-backed defaults for every field.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Selin knowledge-base API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timeout for a single upstream call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name reported to MCP clients
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            server_name: default_server_name(),
        }
    }
}

impl Config {
    /// Get the default config file path (~/.selin/mcp.toml)
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".selin")
            .join("mcp.toml")
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the default path if present, else defaults
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load(path);
        }

        let default_path = Self::default_config_path();
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            debug!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Upstream call timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_base)
            .map_err(|e| Error::Config(format!("api_base '{}' is invalid: {}", self.api_base, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "api_base must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }

        if self.server_name.trim().is_empty() {
            return Err(Error::Config("server_name must not be empty".to_string()));
        }

        Ok(())
    }
}

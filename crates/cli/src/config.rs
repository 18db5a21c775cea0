//! Configuration loading from authz.toml.

use authz::StaticRoles;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Where permissions are persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging setup.
    #[serde(default)]
    pub log: LogConfig,

    /// Static actor-to-roles table used for `--actor` lookups.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
}

/// Storage configuration.
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file. Omitted means an in-memory database.
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Default `tracing` filter directive. `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default_config())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Create a default configuration.
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Build the role resolver from the `[roles]` table.
    pub fn role_table(&self) -> Result<StaticRoles, ConfigError> {
        StaticRoles::from_table(self.roles.clone()).map_err(|e| ConfigError::Roles(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid [roles] table: {0}")]
    Roles(String),
}

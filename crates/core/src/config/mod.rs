//! Configuration for the council services
//!
//! This module provides configuration types and providers. Configuration is
//! stored as TOML and can be overlaid with `COUNCIL_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use serde::{Serialize, Deserialize};
use tracing::info;

/// Error types for configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Parsing error
    #[error("Parsing error: {0}")]
    ParseError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Longest accepted roster freshness window, one year
pub const MAX_FRESHNESS_SECS: u64 = 365 * 24 * 60 * 60;

/// Committee roster caching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// How long a fetched roster is served without refetching, in seconds
    pub freshness_secs: u64,
    /// Threshold used when the roster source does not report one
    pub default_threshold: Option<usize>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 300,
            default_threshold: None,
        }
    }
}

impl RosterConfig {
    /// Freshness window as a duration, saturating at the largest
    /// representable one
    pub fn freshness(&self) -> chrono::Duration {
        i64::try_from(self.freshness_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to storage directory
    pub path: PathBuf,
    /// Whether to sync writes immediately
    pub sync_writes: bool,
    /// Whether to keep read values cached in memory
    pub use_cache: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            sync_writes: true,
            use_cache: true,
        }
    }
}

/// Main configuration for a council service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Roster cache configuration
    pub roster: RosterConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Environment (e.g., "development", "production")
    pub environment: String,
    /// Log level
    pub log_level: String,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            roster: RosterConfig::default(),
            storage: StorageConfig::default(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl CouncilConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values the workflow cannot operate with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.roster.freshness_secs == 0 {
            return Err(ConfigError::InvalidConfig("roster.freshness_secs must be positive".to_string()));
        }
        if self.roster.freshness_secs > MAX_FRESHNESS_SECS {
            return Err(ConfigError::InvalidConfig(format!(
                "roster.freshness_secs must be at most {}",
                MAX_FRESHNESS_SECS
            )));
        }
        if self.roster.default_threshold == Some(0) {
            return Err(ConfigError::InvalidConfig("roster.default_threshold must be positive".to_string()));
        }
        Ok(())
    }
}

/// A configuration provider interface
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Get configuration
    async fn get_config(&self) -> ConfigResult<CouncilConfig>;

    /// Set configuration
    async fn set_config(&self, config: CouncilConfig) -> ConfigResult<()>;
}

/// A file-based configuration provider
pub struct FileConfigProvider {
    /// Path to the configuration file
    config_path: PathBuf,
    /// Cached configuration
    config: Arc<RwLock<Option<CouncilConfig>>>,
}

impl FileConfigProvider {
    /// Create a new file-based configuration provider
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            config: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn get_config(&self) -> ConfigResult<CouncilConfig> {
        {
            let config = self.config.read().await;
            if let Some(config) = config.as_ref() {
                return Ok(config.clone());
            }
        }

        let config = if self.config_path.exists() {
            CouncilConfig::from_file(&self.config_path).await?
        } else {
            info!("No configuration at {}, writing defaults", self.config_path.display());
            let config = CouncilConfig::default();
            config.save_to_file(&self.config_path).await?;
            config
        };

        *self.config.write().await = Some(config.clone());
        Ok(config)
    }

    async fn set_config(&self, config: CouncilConfig) -> ConfigResult<()> {
        config.validate()?;
        config.save_to_file(&self.config_path).await?;
        *self.config.write().await = Some(config);
        Ok(())
    }
}

pub mod env;

pub use env::EnvConfigProvider;

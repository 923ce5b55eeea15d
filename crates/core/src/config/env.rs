//! Environment variable-based configuration
//!
//! Overlays `COUNCIL_*` variables on top of a base configuration. Values that
//! fail to parse are logged and the base value is kept.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;
use super::{CouncilConfig, RosterConfig, StorageConfig, ConfigProvider, ConfigResult};

/// Environment variable prefix for council configuration
pub const ENV_PREFIX: &str = "COUNCIL_";

/// An environment variable-based configuration provider
pub struct EnvConfigProvider {
    /// Base configuration to use as fallback
    base_config: CouncilConfig,
    /// Variable lookup, replaceable for tests
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvConfigProvider {
    /// Create a provider reading the process environment
    pub fn new() -> Self {
        Self::with_base_config(CouncilConfig::default())
    }

    /// Create a new provider with a specific base configuration
    pub fn with_base_config(base_config: CouncilConfig) -> Self {
        Self {
            base_config,
            lookup: Box::new(|key| env::var(key).ok()),
        }
    }

    /// Create a provider reading variables from a custom lookup
    pub fn with_lookup<F>(base_config: CouncilConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            base_config,
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<(String, String)> {
        let env_key = format!("{}{}", ENV_PREFIX, key);
        (self.lookup)(&env_key).map(|value| (env_key, value))
    }

    fn parse_env<T: FromStr>(&self, key: &str, default: T) -> T
    where
        T::Err: std::fmt::Display,
    {
        match self.var(key) {
            Some((env_key, value)) => match value.trim().parse::<T>() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Failed to parse env variable {}: {}", env_key, e);
                    default
                }
            },
            None => default,
        }
    }

    /// An empty value clears the optional setting
    fn parse_optional_env<T: FromStr>(&self, key: &str, default: Option<T>) -> Option<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.var(key) {
            Some((_, value)) if value.trim().is_empty() => None,
            Some((env_key, value)) => match value.trim().parse::<T>() {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Failed to parse env variable {}: {}", env_key, e);
                    default
                }
            },
            None => default,
        }
    }

    fn parse_bool_env(&self, key: &str, default: bool) -> bool {
        match self.var(key) {
            Some((env_key, value)) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "on" => true,
                "false" | "0" | "no" | "n" | "off" => false,
                _ => {
                    warn!("Failed to parse boolean env variable {}", env_key);
                    default
                }
            },
            None => default,
        }
    }

    fn parse_path_env(&self, key: &str, default: PathBuf) -> PathBuf {
        self.var(key).map(|(_, value)| PathBuf::from(value)).unwrap_or(default)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    async fn get_config(&self) -> ConfigResult<CouncilConfig> {
        let base = &self.base_config;

        let roster = RosterConfig {
            freshness_secs: self.parse_env("ROSTER_FRESHNESS_SECS", base.roster.freshness_secs),
            default_threshold: self.parse_optional_env("ROSTER_DEFAULT_THRESHOLD", base.roster.default_threshold),
        };

        let storage = StorageConfig {
            path: self.parse_path_env("STORAGE_PATH", base.storage.path.clone()),
            sync_writes: self.parse_bool_env("STORAGE_SYNC", base.storage.sync_writes),
            use_cache: self.parse_bool_env("STORAGE_CACHE", base.storage.use_cache),
        };

        let config = CouncilConfig {
            roster,
            storage,
            environment: self.parse_env("ENVIRONMENT", base.environment.clone()),
            log_level: self.parse_env("LOG_LEVEL", base.log_level.clone()),
        };

        config.validate()?;
        Ok(config)
    }

    async fn set_config(&self, _config: CouncilConfig) -> ConfigResult<()> {
        Err(super::ConfigError::InvalidConfig(
            "Environment configuration is read-only".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn provider(vars: &[(&str, &str)]) -> EnvConfigProvider {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfigProvider::with_lookup(CouncilConfig::default(), move |key| vars.get(key).cloned())
    }

    #[tokio::test]
    async fn test_env_overrides_base() {
        let config = provider(&[
            ("COUNCIL_ROSTER_FRESHNESS_SECS", "120"),
            ("COUNCIL_ROSTER_DEFAULT_THRESHOLD", "4"),
            ("COUNCIL_STORAGE_SYNC", "off"),
            ("COUNCIL_LOG_LEVEL", "trace"),
        ]).get_config().await.unwrap();

        assert_eq!(config.roster.freshness_secs, 120);
        assert_eq!(config.roster.default_threshold, Some(4));
        assert!(!config.storage.sync_writes);
        assert_eq!(config.log_level, "trace");
    }

    #[tokio::test]
    async fn test_unparseable_values_keep_base() {
        let config = provider(&[
            ("COUNCIL_ROSTER_FRESHNESS_SECS", "soon"),
            ("COUNCIL_STORAGE_CACHE", "maybe"),
        ]).get_config().await.unwrap();

        assert_eq!(config.roster.freshness_secs, 300);
        assert!(config.storage.use_cache);
    }

    #[tokio::test]
    async fn test_zero_threshold_is_rejected() {
        let result = provider(&[("COUNCIL_ROSTER_DEFAULT_THRESHOLD", "0")]).get_config().await;
        assert!(result.is_err());
    }
}

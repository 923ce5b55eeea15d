//! Core council module
//!
//! This module provides the runtime foundations shared by the committee
//! workflow crates: persistence, configuration, time and tracing.

pub mod storage;
pub mod config;
pub mod clock;
pub mod utils;

// Re-export key components
pub use storage::{Storage, StorageResult, StorageError, JsonStorage, FileStorage, MemoryStorage};
pub use config::{CouncilConfig, ConfigError, ConfigResult, ConfigProvider};
pub use clock::{Clock, SystemClock, ManualClock};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Package description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize tracing for the council services.
///
/// `RUST_LOG` takes precedence over `default_level` when set. Fails if a
/// global subscriber has already been installed.
pub fn init_tracing(default_level: &str) -> Result<(), ConfigError> {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| ConfigError::InvalidConfig(format!("Invalid log level {}: {}", default_level, e)))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::InvalidConfig(format!("Failed to set global tracing subscriber: {}", e)))
}

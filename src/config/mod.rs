//! Configuration management.
//!
//! This module provides a layered configuration system that loads settings
//! from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use processvault::config::Config;
//!
//! let config = Config::load().expect("failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the
//! pattern `PROCESSVAULT__<section>__<key>`:
//!
//! - `PROCESSVAULT__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `PROCESSVAULT__WORKER__BATCH_SIZE=10`
//!
//! # Configuration File
//!
//! By default, configuration is loaded from `config/processvault.toml`. This
//! can be overridden using the `PROCESSVAULT_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, RetentionConfig, SchedulerConfig, ServerConfig, StorageConfig, StorageProvider,
    TelemetryConfig, UpstreamConfig, WebhookConfig, WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path. Useful for testing with
    /// custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[worker]
batch_size = 7
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.worker.batch_size, 7);
    }

    #[test]
    fn test_validation_catches_zero_batch_size() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[worker]
batch_size = 0
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidBatchSize)
        ));
    }
}

//! Configuration management for the vault build pipeline.
//!
//! Settings are loaded in layers:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `VAULTFORGE__SECTION__KEY` environment variables
//! 4. A handful of bare, spec-named environment variables and dev secrets
//!    loaded through dotenvy (`PORT`, `TEMP_DIR`, `R2_*`, `GITHUB_TOKEN`, ...)
//!
//! # Usage
//!
//! ```no_run
//! use vaultforge_worker::config::Config;
//!
//! let config = Config::load().expect("failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! By default, configuration is loaded from `config/vaultforge.toml`. This
//! can be overridden using the `VAULTFORGE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, DatabaseConfig, EmbeddingConfig, IframeCategoryConfig, IframeEmbedConfig, JobConfig,
    MediaConfig, MediaFormatConfig, MediaSizeConfig, MermaidStrategy, MarkdownConfig,
    PublisherConfig, RetentionConfig, ServerConfig, SimilarityConfig, SourceConfig, StorageConfig,
    StorageProvider,
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
    /// Load configuration from all sources (file + environment), then
    /// validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path. Useful for `--config` and
    /// for tests with custom fixtures.
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
[server]
bind_addr = "0.0.0.0:8080"

[similarity]
k = 10
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.similarity.k, 10);
    }

    #[test]
    fn test_validation_catches_oversized_payload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
max_payload_bytes = "1GB"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::PayloadSizeExceedsCeiling { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
fjall_path = "data/jobs"

[storage]
provider = "local"
bucket = "vaultforge-default"

[markdown]
mermaid_strategy = "inline-svg"

[similarity]
k = 8

[publisher]
concurrency = 6

[retention]
job_ttl_days = 30
ledger_max_bytes = "50GB"
logs_ttl_days = 30
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.markdown.mermaid_strategy, MermaidStrategy::InlineSvg);
        assert_eq!(config.similarity.k, 8);
        assert_eq!(config.publisher.concurrency, 6);
        assert_eq!(config.retention.job_ttl_days, 30);
    }
}

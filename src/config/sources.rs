//! Loads configuration from defaults, an optional TOML file, and the
//! environment (spec §2a: defaults -> TOML -> `VAULTFORGE__SECTION__KEY`
//! env vars -> a final explicit-override pass applying the handful of
//! bare, spec-mandated env vars and dev secrets loaded through dotenvy).

use super::models::{Config, StorageProvider};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "VAULTFORGE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/vaultforge.toml";
const ENV_PREFIX: &str = "VAULTFORGE";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. `VAULTFORGE__SECTION__KEY` environment variables
/// 4. Bare, spec-named environment variables and dotenvy secrets
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path, still applying env overrides
/// on top. Useful for `--config` and for tests with custom fixtures.
pub fn load_from_path(path: &str) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    let mut config = load_from_sources(PathBuf::from(path))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load configuration from a specific path and environment.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("loading configuration from {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "no config file at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

/// Applies the bare (unprefixed) environment variables named explicitly
/// in spec §6: `PORT`, `TEMP_DIR`, `KEEP_TMP_FILES`, `PURGE_TMP_DIR`,
/// `SKIP_EMBEDDINGS`, the `R2_*` storage credentials, and `GITHUB_TOKEN`.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = env::var("PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.server.bind_addr.set_port(port);
        }
    }

    if let Ok(temp_dir) = env::var("TEMP_DIR") {
        config.job.temp_dir = temp_dir.into();
    }

    config.job.keep_tmp_files = env_flag("KEEP_TMP_FILES");
    config.job.purge_tmp_dir = env_flag("PURGE_TMP_DIR");
    config.embedding.skip_embeddings = env_flag("SKIP_EMBEDDINGS");

    if let Ok(account_id) = env::var("R2_ACCOUNT_ID") {
        config.storage.account_id = Some(account_id);
        config.storage.provider = StorageProvider::R2;
    }
    if let Ok(access_key) = env::var("R2_ACCESS_KEY_ID") {
        config.storage.access_key = Some(access_key);
    }
    if let Ok(secret_key) = env::var("R2_SECRET_ACCESS_KEY") {
        config.storage.secret_key = Some(secret_key);
    }
    if let Ok(bucket) = env::var("R2_BUCKET_NAME") {
        config.storage.bucket = bucket;
    }
    if let Ok(token) = env::var("GITHUB_TOKEN") {
        config.source.github_token = Some(token);
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

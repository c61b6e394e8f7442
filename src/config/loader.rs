//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::StorefrontConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables that override file values.
pub const ENV_ADMIN_EMAIL: &str = "ADMIN_EMAIL";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_HEALTH_CHECK_TOKEN: &str = "HEALTH_CHECK_TOKEN";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<StorefrontConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: StorefrontConfig = toml::from_str(&content)?;
    finalize(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn load_default() -> Result<StorefrontConfig, ConfigError> {
    finalize(StorefrontConfig::default())
}

fn finalize(mut config: StorefrontConfig) -> Result<StorefrontConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment values onto the config.
///
/// `REDIS_URL` and `DATABASE_URL` only fill in connection strings; they never
/// switch a backend or enable the cache on their own.
pub fn apply_env_overrides<F>(config: &mut StorefrontConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(email) = lookup(ENV_ADMIN_EMAIL).filter(|v| !v.is_empty()) {
        config.admin.email = email;
    }
    if let Some(url) = lookup(ENV_REDIS_URL).filter(|v| !v.is_empty()) {
        config.rate_limit.redis_url.get_or_insert_with(|| url.clone());
        config.cache.redis_url.get_or_insert(url);
    }
    if let Some(token) = lookup(ENV_HEALTH_CHECK_TOKEN).filter(|v| !v.is_empty()) {
        config.health.token = Some(token);
    }
    if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
        config.database.url = Some(url);
    }
}

//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics (value ranges,
//! required companions such as a connection string for the external store).
//! All errors are collected rather than stopping at the first one.

use std::net::SocketAddr;

use crate::config::schema::{RatePolicy, RateLimitStore, StoreBackend, StorefrontConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &StorefrontConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    let admin = config.admin.email.trim();
    if admin.is_empty() || !admin.contains('@') {
        errors.push(ValidationError::new("admin.email", "must be an email address"));
    }

    if !(4..=31).contains(&config.auth.bcrypt_cost) {
        errors.push(ValidationError::new("auth.bcrypt_cost", "must be between 4 and 31"));
    }
    if config.auth.session_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.session_ttl_secs", "must be greater than 0"));
    }
    if config.auth.verification_token_ttl_secs == 0 {
        errors.push(ValidationError::new(
            "auth.verification_token_ttl_secs",
            "must be greater than 0",
        ));
    }

    let db = &config.database;
    if db.backend == StoreBackend::Sqlite && db.url.as_deref().unwrap_or("").is_empty() {
        errors.push(ValidationError::new(
            "database.url",
            "required when database.backend = \"sqlite\"",
        ));
    }
    if db.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be greater than 0"));
    }

    let rl = &config.rate_limit;
    if rl.store == RateLimitStore::External && rl.redis_url.as_deref().unwrap_or("").is_empty() {
        errors.push(ValidationError::new(
            "rate_limit.redis_url",
            "required when rate_limit.store = \"external\"",
        ));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than 0"));
    }
    for (name, policy) in [("default", &rl.default), ("auth", &rl.auth), ("checkout", &rl.checkout)] {
        check_policy(&mut errors, name, policy);
    }

    if config.cache.enabled && config.cache.redis_url.as_deref().unwrap_or("").is_empty() {
        errors.push(ValidationError::new("cache.redis_url", "required when cache.enabled = true"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_policy(errors: &mut Vec<ValidationError>, name: &str, policy: &RatePolicy) {
    if policy.limit == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}.limit"),
            "must be greater than 0",
        ));
    }
    if policy.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}.window_ms"),
            "must be greater than 0",
        ));
    }
}

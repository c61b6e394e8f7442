//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the storefront.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the storefront API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorefrontConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request hardening settings.
    pub security: SecurityConfig,

    /// Back-office identity.
    pub admin: AdminConfig,

    /// Session and password settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Persistence backend.
    pub database: DatabaseConfig,

    /// Key-value response cache.
    pub cache: CacheConfig,

    /// Health endpoint settings.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a request, including the persistence call.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Derive the client IP from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            trust_forwarded_headers: true,
        }
    }
}

/// Admin back-office configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// The single email address allowed into admin routes.
    pub email: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            email: "admin@example.com".to_string(),
        }
    }
}

/// Session and password hashing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of an issued session token in seconds.
    pub session_ttl_secs: u64,

    /// bcrypt cost factor (4..=31).
    pub bcrypt_cost: u32,

    /// Lifetime of the verification token issued at signup, in seconds.
    pub verification_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 7 * 24 * 60 * 60,
            bcrypt_cost: 10,
            verification_token_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Which store serves the repositories.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Process-local tables. Lost on restart; intended for development and tests.
    Memory,
    /// SQLite database through a sqlx pool, migrated at startup.
    Sqlite,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,

    /// Connection string, e.g. "sqlite://storefront.db". Required for sqlite.
    pub url: Option<String>,

    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            max_connections: 5,
        }
    }
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitStore {
    /// Process-local counters. Lost on restart; intended for development.
    InMemory,
    /// Counters in Redis, shared between processes and surviving restarts.
    External,
}

/// What to do with a request when the external counter store fails.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Let the request through and log the store error.
    Open,
    /// Reject the request with 503.
    Closed,
}

/// A fixed-window quota.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RatePolicy {
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RatePolicy {
    pub const fn new(limit: u64, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Counter backend. Never inferred from `redis_url`.
    pub store: RateLimitStore,

    /// Connection string for the external store.
    pub redis_url: Option<String>,

    /// Behavior when the external store is unreachable.
    pub failure_policy: FailurePolicy,

    /// How often expired in-memory records are purged.
    pub sweep_interval_secs: u64,

    /// Bound on distinct in-memory keys. A full table sweeps expired records
    /// and stops tracking new keys while nothing has expired.
    pub max_tracked_keys: usize,

    /// Quota for general browsing routes.
    pub default: RatePolicy,

    /// Quota for signup / signin.
    pub auth: RatePolicy,

    /// Quota for order placement.
    pub checkout: RatePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            store: RateLimitStore::InMemory,
            redis_url: None,
            failure_policy: FailurePolicy::Open,
            sweep_interval_secs: 60,
            max_tracked_keys: 100_000,
            default: RatePolicy::new(100, 15 * 60 * 1000),
            auth: RatePolicy::new(5, 15 * 60 * 1000),
            checkout: RatePolicy::new(10, 60 * 1000),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the Redis-backed cache. Requires `redis_url`.
    pub enabled: bool,

    /// Connection string for the cache.
    pub redis_url: Option<String>,

    /// Default entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: None,
            ttl_secs: 3600,
        }
    }
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HealthConfig {
    /// Value expected in `x-health-check-token`. `None` disables the check.
    pub token: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

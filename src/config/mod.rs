//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse, apply ADMIN_EMAIL / REDIS_URL / HEALTH_CHECK_TOKEN)
//!     → validation.rs (semantic checks)
//!     → StorefrontConfig (validated, immutable)
//!     → shared with all subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - The rate-limit store is chosen explicitly, never inferred from a URL

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_default, ConfigError};
pub use schema::{
    AdminConfig, AuthConfig, CacheConfig, DatabaseConfig, FailurePolicy, HealthConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, RateLimitStore, RatePolicy,
    SecurityConfig, StoreBackend, StorefrontConfig, TimeoutConfig,
};

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (inside a route pipeline):
//!     → rate_limit.rs (fixed-window quota per client IP and scope)
//!     → sanitize.rs (strip tags and quote/angle characters from strings)
//!     → schema.rs + schemas.rs (field-level validation)
//!     → Pass to handler
//! ```
//!
//! # Design Decisions
//! - Expected conditions (over quota, invalid field) are values, not errors
//! - Only store failures surface as `RateLimitError`
//! - Sanitization always runs before validation

pub mod rate_limit;
pub mod rate_limit_redis;
pub mod sanitize;
pub mod schema;
pub mod schemas;

pub use rate_limit::{
    build_rate_limiter, spawn_sweeper, Clock, Decision, ManualClock, MemoryRateLimiter,
    RateLimitError, RateLimiter, SystemClock,
};
pub use rate_limit_redis::RedisRateLimiter;
pub use sanitize::{sanitize, sanitize_deep};
pub use schema::{Field, FieldErrors, Schema, ValidationResult};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → rate limit store → cache → sessions + store → AppState
//!     → background tasks (rate limit sweeper)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain in-flight requests → stop
//!     background tasks → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then stores, then listeners
//! - Fail fast: an unreachable external store is a startup error, not a
//!   silent fallback

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{build_state, spawn_background_tasks, StartupError};

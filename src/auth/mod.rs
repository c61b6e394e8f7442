//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! signin (email + password)
//!     → password.rs (bcrypt verify)
//!     → session.rs (issue opaque bearer token)
//!
//! Authorization: Bearer <token>
//!     → SessionResolver::resolve
//!     → Session { user_id, email, name }  (or nothing)
//! ```
//!
//! # Design Decisions
//! - Tokens are random UUIDs, never derived from user data
//! - An expired session resolves to nothing and is removed on sight
//! - Admin is a single configured email, not a role

pub mod password;
pub mod session;

pub use password::{hash_password, verification_token, verify_password};
pub use session::{bearer_token, Session, SessionResolver, SessionStore};

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

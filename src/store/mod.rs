//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! Route handler
//!     → repository trait (one async call per operation)
//!     → memory.rs (in-process tables) or sqlite.rs (sqlx pool)
//!     → cache.rs (optional read-through JSON cache for hot reads)
//! ```
//!
//! # Design Decisions
//! - Handlers only see traits; backends are swappable and mockable in tests
//! - Each mutation applies fully or not at all (order placement included)
//! - `NotFound` / `Conflict` / `Rejected` are expected outcomes; `Backend`
//!   is the only unexpected one

pub mod cache;
pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use cache::KvCache;
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

pub const INVALID_RESET_TOKEN: &str = "Invalid or expired token";
pub const UNLINKED_RESET_TOKEN: &str = "Invalid token";

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Rejected(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: u64,
    pub limit: u64,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Fails with `Conflict` when the new email belongs to another user.
    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, StoreError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Newest first. Returns the page and the total matching count.
    async fn list_products(
        &self,
        window: Window,
        category_id: Option<i64>,
    ) -> Result<(Vec<Product>, u64), StoreError>;
    async fn find_product(&self, id: i64) -> Result<Option<Product>, StoreError>;
    /// Same category first, newest first, never the product itself.
    async fn related_products(&self, id: i64, limit: usize) -> Result<Vec<Product>, StoreError>;
    async fn create_product(&self, product: NewProduct) -> Result<Product, StoreError>;
    async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product, StoreError>;
    async fn delete_product(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Ordered by name, with product counts.
    async fn list_categories(&self) -> Result<Vec<CategorySummary>, StoreError>;
    /// Fails with `Conflict` when the slug is taken.
    async fn create_category(&self, category: NewCategory) -> Result<Category, StoreError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Check stock, decrement it and record the order as one unit.
    async fn place_order(&self, order: NewOrder) -> Result<Order, StoreError>;
    /// Newest first. Returns the page and the user's total order count.
    async fn list_orders(&self, user_id: i64, window: Window) -> Result<(Vec<Order>, u64), StoreError>;
}

#[async_trait]
pub trait WishlistRepository: Send + Sync {
    async fn list_wishlist(&self, user_id: i64) -> Result<Vec<WishlistEntry>, StoreError>;
    async fn add_to_wishlist(&self, user_id: i64, product_id: i64) -> Result<WishlistEntry, StoreError>;
    async fn remove_from_wishlist(&self, user_id: i64, product_id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Fails with `Conflict` when the token value already exists.
    async fn create_token(&self, token: VerificationToken) -> Result<(), StoreError>;
    /// Set the linked user's password hash and delete the token, as one unit.
    /// Unknown or expired tokens are `Rejected` and left untouched.
    async fn reset_password(
        &self,
        token: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
}

/// Liveness check used by the health route.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// A backend serving every repository.
pub trait Storefront:
    UserRepository
    + ProductRepository
    + CategoryRepository
    + OrderRepository
    + WishlistRepository
    + TokenRepository
    + HealthProbe
{
}

impl<T> Storefront for T where
    T: UserRepository
        + ProductRepository
        + CategoryRepository
        + OrderRepository
        + WishlistRepository
        + TokenRepository
        + HealthProbe
{
}

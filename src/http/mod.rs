//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, server-wide layers)
//!     → request.rs (request ID, client address)
//!     → [route pipeline: pipeline/]
//!     → extract.rs (session, validated body for handlers)
//!     → response.rs (envelope or bare body, error statuses)
//!     → Send to client
//! ```

pub mod extract;
pub mod pagination;
pub mod request;
pub mod response;
pub mod server;

pub use extract::{AdminSession, Authenticated, ClientContext, Valid};
pub use pagination::{validate_pagination, PageQuery, Pagination, PaginationMeta};
pub use request::{client_ip, request_id, X_REQUEST_ID};
pub use response::{ApiError, Envelope, InternalFailure, Legacy, ResponseStyle};
pub use server::{AppState, HttpServer};

//! Storefront API Library

pub mod admin;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routes;
pub mod security;
pub mod store;

pub use config::schema::StorefrontConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;

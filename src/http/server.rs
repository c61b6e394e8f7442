//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all storefront routes
//! - Wire up server-wide middleware (request ID, tracing, panic safety net,
//!   body limit, timeout)
//! - Bind to the listener and shut down gracefully

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{SessionResolver, SessionStore};
use crate::config::StorefrontConfig;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::ApiError;
use crate::routes;
use crate::security::{Clock, RateLimiter};
use crate::store::{
    CategoryRepository, HealthProbe, KvCache, OrderRepository, ProductRepository, Storefront,
    TokenRepository, UserRepository, WishlistRepository,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<StorefrontConfig>,
    pub clock: Arc<dyn Clock>,
    pub limiter: Arc<dyn RateLimiter>,
    pub sessions: Arc<SessionStore>,
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub wishlist: Arc<dyn WishlistRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub health: Arc<dyn HealthProbe>,
    pub cache: KvCache,
    pub started: Instant,
}

impl AppState {
    /// State with every repository served by one store.
    pub fn new<S: Storefront + 'static>(
        config: StorefrontConfig,
        clock: Arc<dyn Clock>,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<S>,
        cache: KvCache,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(clock.clone(), config.auth.session_ttl_secs));
        Self {
            config: Arc::new(config),
            clock,
            limiter,
            sessions,
            users: store.clone(),
            products: store.clone(),
            categories: store.clone(),
            orders: store.clone(),
            wishlist: store.clone(),
            tokens: store.clone(),
            health: store,
            cache,
            started: Instant::now(),
        }
    }

    pub fn resolver(&self) -> Arc<dyn SessionResolver> {
        self.sessions.clone()
    }
}

/// HTTP server for the storefront API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let config = state.config.clone();
        routes::router(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request_id(req),
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Last-resort 500 for panics outside a route pipeline.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    tracing::error!(error = %detail, "Panic outside route pipeline");
    ApiError::internal(detail).into_response()
}

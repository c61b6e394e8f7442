//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use storefront_api::config::{RatePolicy, StorefrontConfig};
use storefront_api::http::{AppState, HttpServer};
use storefront_api::security::{ManualClock, MemoryRateLimiter};
use storefront_api::store::{
    KvCache, MemoryStore, NewOrder, NewProduct, NewUser, Order, OrderRepository, Product,
    ProductRepository, StoreError, UserRepository, Window,
};

pub const ADMIN_EMAIL: &str = "admin@shop.test";
pub const CLIENT_IP: &str = "203.0.113.50";
pub const START_MS: u64 = 1_700_000_000_000;

/// Order repository that counts placement attempts.
pub struct CountingOrders {
    inner: Arc<MemoryStore>,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OrderRepository for CountingOrders {
    async fn place_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.place_order(order).await
    }

    async fn list_orders(&self, user_id: i64, window: Window) -> Result<(Vec<Order>, u64), StoreError> {
        self.inner.list_orders(user_id, window).await
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub order_calls: Arc<AtomicUsize>,
}

/// Defaults tuned for tests: fast bcrypt, tight checkout quota, trusted
/// forwarded headers so each test can pick its client address.
pub fn test_config() -> StorefrontConfig {
    let mut config = StorefrontConfig::default();
    config.admin.email = ADMIN_EMAIL.into();
    config.auth.bcrypt_cost = 4;
    config.security.trust_forwarded_headers = true;
    config.rate_limit.checkout = RatePolicy::new(2, 60_000);
    config
}

pub fn spawn_app(config: StorefrontConfig) -> TestApp {
    let clock = Arc::new(ManualClock::new(START_MS));
    let limiter = Arc::new(MemoryRateLimiter::new(clock.clone(), config.rate_limit.max_tracked_keys));
    let store = Arc::new(MemoryStore::new());
    let mut state = AppState::new(config, clock.clone(), limiter, store.clone(), KvCache::disabled());

    let order_calls = Arc::new(AtomicUsize::new(0));
    state.orders = Arc::new(CountingOrders {
        inner: store.clone(),
        calls: order_calls.clone(),
    });

    TestApp {
        state,
        store,
        clock,
        order_calls,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        HttpServer::build_router(self.state.clone())
    }

    /// Create a user directly and return a bearer token for it.
    pub async fn login_as(&self, email: &str) -> String {
        let user = self
            .store
            .create_user(NewUser {
                name: "Test User".into(),
                email: email.into(),
                password_hash: "unused".into(),
            })
            .await
            .unwrap();
        self.state.sessions.issue(&user).0
    }

    pub async fn seed_product(&self, title: &str, price: f64, stock: i64) -> Product {
        self.store
            .create_product(NewProduct {
                title: title.into(),
                description: Some("Seeded".into()),
                price,
                stock,
                category_id: None,
                image_url: "https://cdn.example.com/item.png".into(),
                discount_percentage: None,
            })
            .await
            .unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        send_to(self.router(), req).await
    }
}

/// Drive one request through `router` and collect the JSON answer.
pub async fn send_to(router: Router, req: Request<Body>) -> TestResponse {
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse { status, headers, body }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

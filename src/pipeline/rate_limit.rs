//! Fixed-window throttling stage.
//!
//! Key: `rate-limit:{scope}:{client}`. Allowed requests get
//! `X-RateLimit-Limit/Remaining/Reset` on the way out; throttled ones get a
//! 429 with `Retry-After`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;

use crate::config::{FailurePolicy, RatePolicy};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::pipeline::{Flow, Phase, RequestContext, Stage};
use crate::security::RateLimiter;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub struct RateLimitStage {
    limiter: Arc<dyn RateLimiter>,
    scope: &'static str,
    policy: RatePolicy,
    on_store_error: FailurePolicy,
}

impl RateLimitStage {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        scope: &'static str,
        policy: RatePolicy,
        on_store_error: FailurePolicy,
    ) -> Self {
        Self {
            limiter,
            scope,
            policy,
            on_store_error,
        }
    }

    pub fn key(&self, client: &str) -> String {
        format!("rate-limit:{}:{client}", self.scope)
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn phase(&self) -> Phase {
        Phase::RateLimit
    }

    async fn before(&self, req: Request<Body>, ctx: &mut RequestContext) -> Flow {
        let key = self.key(&ctx.client_ip);
        let decision = match self.limiter.check(&key, self.policy).await {
            Ok(decision) => decision,
            Err(e) => {
                let policy = match self.on_store_error {
                    FailurePolicy::Open => "open",
                    FailurePolicy::Closed => "closed",
                };
                metrics::record_store_error(policy);
                tracing::error!(
                    request_id = %ctx.request_id,
                    backend = self.limiter.backend(),
                    scope = self.scope,
                    policy,
                    error = %e,
                    "Rate limit store unavailable"
                );
                return match self.on_store_error {
                    FailurePolicy::Open => Flow::Continue(req),
                    FailurePolicy::Closed => Flow::Halt(
                        ctx.reject(ApiError::Unavailable("Service temporarily unavailable".into())),
                    ),
                };
            }
        };

        if decision.allowed {
            ctx.rate_limit = Some(decision);
            return Flow::Continue(req);
        }

        let retry_after_secs = decision.retry_after_secs(self.limiter.now_ms());
        metrics::record_rate_limited(self.scope);
        tracing::warn!(
            request_id = %ctx.request_id,
            client = %ctx.client_ip,
            scope = self.scope,
            count = decision.count,
            limit = decision.limit,
            retry_after_secs,
            "Rate limit exceeded"
        );
        Flow::Halt(ctx.reject(ApiError::RateLimited { retry_after_secs }))
    }

    fn after(&self, ctx: &RequestContext, response: &mut Response) {
        // Absent when the store failed open
        let Some(decision) = ctx.rate_limit else {
            return;
        };
        let headers = response.headers_mut();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_time_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ResponseStyle;
    use crate::security::{Decision, ManualClock, MemoryRateLimiter, RateLimitError};
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;

    struct Broken;

    #[async_trait]
    impl RateLimiter for Broken {
        async fn check(&self, _key: &str, _policy: RatePolicy) -> Result<Decision, RateLimitError> {
            Err(RateLimitError::Config("unreachable".into()))
        }

        fn now_ms(&self) -> u64 {
            0
        }

        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    fn request() -> (Request<Body>, RequestContext) {
        let req = Request::builder()
            .uri("/api/checkout")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_request(&req, ResponseStyle::Enveloped, true);
        (req, ctx)
    }

    fn memory_limiter(clock: Arc<ManualClock>) -> Arc<dyn RateLimiter> {
        Arc::new(MemoryRateLimiter::new(clock, 1_000))
    }

    #[test]
    fn test_key_includes_scope_and_client() {
        let clock = Arc::new(ManualClock::new(0));
        let stage = RateLimitStage::new(
            memory_limiter(clock),
            "checkout",
            RatePolicy::new(2, 60_000),
            FailurePolicy::Open,
        );
        assert_eq!(stage.key("203.0.113.9"), "rate-limit:checkout:203.0.113.9");
    }

    #[tokio::test]
    async fn test_third_hit_is_throttled_with_retry_after() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let stage = RateLimitStage::new(
            memory_limiter(clock.clone()),
            "checkout",
            RatePolicy::new(2, 60_000),
            FailurePolicy::Open,
        );

        for remaining in [1u64, 0] {
            let (req, mut ctx) = request();
            assert!(matches!(stage.before(req, &mut ctx).await, Flow::Continue(_)));

            let mut response = "ok".into_response();
            stage.after(&ctx, &mut response);
            assert_eq!(response.headers()[&X_RATELIMIT_LIMIT], "2");
            assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], remaining.to_string().as_str());
            assert_eq!(response.headers()[&X_RATELIMIT_RESET], "1060000");
        }

        clock.advance(500);
        let (req, mut ctx) = request();
        match stage.before(req, &mut ctx).await {
            Flow::Halt(response) => {
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(response.headers()[header::RETRY_AFTER], "60");
            }
            Flow::Continue(_) => panic!("third request should be throttled"),
        }
    }

    #[tokio::test]
    async fn test_fail_open_continues_without_headers() {
        let stage = RateLimitStage::new(Arc::new(Broken), "default", RatePolicy::new(1, 1_000), FailurePolicy::Open);
        let (req, mut ctx) = request();
        assert!(matches!(stage.before(req, &mut ctx).await, Flow::Continue(_)));

        let mut response = "ok".into_response();
        stage.after(&ctx, &mut response);
        assert!(response.headers().get(&X_RATELIMIT_LIMIT).is_none());
    }

    #[tokio::test]
    async fn test_fail_closed_is_503() {
        let stage = RateLimitStage::new(Arc::new(Broken), "default", RatePolicy::new(1, 1_000), FailurePolicy::Closed);
        let (req, mut ctx) = request();
        match stage.before(req, &mut ctx).await {
            Flow::Halt(response) => assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE),
            Flow::Continue(_) => panic!("closed policy must reject"),
        }
    }
}

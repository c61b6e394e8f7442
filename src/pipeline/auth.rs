//! Session gates.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;

use crate::auth::SessionResolver;
use crate::http::response::ApiError;
use crate::pipeline::{Flow, Phase, RequestContext, Stage};

/// Requires a resolvable session; 401 otherwise.
pub struct AuthenticateStage {
    resolver: Arc<dyn SessionResolver>,
}

impl AuthenticateStage {
    pub fn new(resolver: Arc<dyn SessionResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for AuthenticateStage {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn phase(&self) -> Phase {
        Phase::Authenticate
    }

    async fn before(&self, req: Request<Body>, ctx: &mut RequestContext) -> Flow {
        match self.resolver.resolve(req.headers()).await {
            Some(session) => {
                ctx.session = Some(session);
                Flow::Continue(req)
            }
            None => {
                tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, "No session");
                Flow::Halt(ctx.reject(ApiError::Unauthenticated))
            }
        }
    }
}

/// Requires a session belonging to the configured admin email; 403
/// otherwise, including when there is no session at all.
pub struct RequireAdminStage {
    resolver: Arc<dyn SessionResolver>,
    admin_email: String,
}

impl RequireAdminStage {
    pub fn new(resolver: Arc<dyn SessionResolver>, admin_email: impl Into<String>) -> Self {
        Self {
            resolver,
            admin_email: admin_email.into(),
        }
    }
}

#[async_trait]
impl Stage for RequireAdminStage {
    fn name(&self) -> &'static str {
        "require_admin"
    }

    fn phase(&self) -> Phase {
        Phase::Authenticate
    }

    async fn before(&self, req: Request<Body>, ctx: &mut RequestContext) -> Flow {
        match self.resolver.resolve(req.headers()).await {
            Some(session) if session.email == self.admin_email => {
                ctx.session = Some(session);
                ctx.is_admin = true;
                Flow::Continue(req)
            }
            session => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %ctx.path,
                    client = %ctx.client_ip,
                    user_id = session.as_ref().map(|s| s.user_id),
                    "Admin access denied"
                );
                Flow::Halt(ctx.reject(ApiError::Forbidden))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::http::response::ResponseStyle;
    use axum::http::{HeaderMap, StatusCode};

    struct Fixed(Option<Session>);

    #[async_trait]
    impl SessionResolver for Fixed {
        async fn resolve(&self, _headers: &HeaderMap) -> Option<Session> {
            self.0.clone()
        }
    }

    fn session(email: &str) -> Session {
        Session {
            user_id: 9,
            email: email.into(),
            name: "Ann".into(),
            expires_at_ms: u64::MAX,
        }
    }

    fn ctx() -> (Request<Body>, RequestContext) {
        let req = Request::builder().uri("/api/admin/products").body(Body::empty()).unwrap();
        let ctx = RequestContext::from_request(&req, ResponseStyle::Enveloped, false);
        (req, ctx)
    }

    fn halted_status(flow: Flow) -> Option<StatusCode> {
        match flow {
            Flow::Halt(response) => Some(response.status()),
            Flow::Continue(_) => None,
        }
    }

    #[tokio::test]
    async fn test_authenticate_without_session_is_401() {
        let stage = AuthenticateStage::new(Arc::new(Fixed(None)));
        let (req, mut ctx) = ctx();
        assert_eq!(halted_status(stage.before(req, &mut ctx).await), Some(StatusCode::UNAUTHORIZED));
        assert!(ctx.session.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_records_session() {
        let stage = AuthenticateStage::new(Arc::new(Fixed(Some(session("ann@example.com")))));
        let (req, mut ctx) = ctx();
        assert_eq!(halted_status(stage.before(req, &mut ctx).await), None);
        assert_eq!(ctx.session.map(|s| s.user_id), Some(9));
    }

    #[tokio::test]
    async fn test_admin_requires_exact_email() {
        let stage = RequireAdminStage::new(
            Arc::new(Fixed(Some(session("user@example.com")))),
            "admin@example.com",
        );
        let (req, mut ctx) = self::ctx();
        assert_eq!(halted_status(stage.before(req, &mut ctx).await), Some(StatusCode::FORBIDDEN));

        let stage = RequireAdminStage::new(Arc::new(Fixed(None)), "admin@example.com");
        let (req, mut ctx) = self::ctx();
        assert_eq!(halted_status(stage.before(req, &mut ctx).await), Some(StatusCode::FORBIDDEN));

        let stage = RequireAdminStage::new(
            Arc::new(Fixed(Some(session("admin@example.com")))),
            "admin@example.com",
        );
        let (req, mut ctx) = self::ctx();
        assert_eq!(halted_status(stage.before(req, &mut ctx).await), None);
        assert!(ctx.is_admin);
    }
}

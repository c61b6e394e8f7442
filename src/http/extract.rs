//! Handler-side access to what the pipeline established.
//!
//! Each extractor fails with an internal error when the route's pipeline
//! lacks the stage it depends on: that is a wiring mistake, not a client one.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::auth::Session;
use crate::http::response::ApiError;
use crate::pipeline::RequestContext;

fn context(parts: &Parts) -> Result<&RequestContext, ApiError> {
    parts
        .extensions
        .get::<RequestContext>()
        .ok_or_else(|| ApiError::internal(format!("no pipeline on route {}", parts.uri.path())))
}

/// The whole request context.
#[derive(Debug, Clone)]
pub struct ClientContext(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        context(parts).cloned().map(Self)
    }
}

/// The session resolved by the authenticate stage.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = context(parts)?;
        ctx.session
            .clone()
            .map(Self)
            .ok_or_else(|| ApiError::internal(format!("no authenticate stage on route {}", ctx.path)))
    }
}

/// The admin session established by the require-admin stage.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = context(parts)?;
        match (&ctx.session, ctx.is_admin) {
            (Some(session), true) => Ok(Self(session.clone())),
            _ => Err(ApiError::internal(format!("no require_admin stage on route {}", ctx.path))),
        }
    }
}

/// The sanitized, validated body, deserialized into `T`.
#[derive(Debug, Clone)]
pub struct Valid<T>(pub T);

impl<S: Send + Sync, T: DeserializeOwned> FromRequestParts<S> for Valid<T> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = context(parts)?;
        let value = ctx
            .validated
            .clone()
            .ok_or_else(|| ApiError::internal(format!("no validate stage on route {}", ctx.path)))?;
        serde_json::from_value(value)
            .map(Self)
            .map_err(|e| ApiError::internal(format!("validated body does not fit handler type: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ResponseStyle;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Wish {
        product_id: i64,
    }

    fn parts_with(ctx: Option<RequestContext>) -> Parts {
        let mut req = Request::builder().uri("/api/wishlist").body(Body::empty()).unwrap();
        if let Some(ctx) = ctx {
            req.extensions_mut().insert(ctx);
        }
        req.into_parts().0
    }

    fn base_ctx() -> RequestContext {
        let req = Request::builder().uri("/api/wishlist").body(Body::empty()).unwrap();
        RequestContext::from_request(&req, ResponseStyle::Bare, false)
    }

    #[tokio::test]
    async fn test_valid_deserializes_typed_body() {
        let mut ctx = base_ctx();
        ctx.validated = Some(json!({ "productId": 4 }));
        let mut parts = parts_with(Some(ctx));

        let Valid(wish) = Valid::<Wish>::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(wish, Wish { product_id: 4 });
    }

    #[tokio::test]
    async fn test_missing_stage_is_internal() {
        let mut parts = parts_with(Some(base_ctx()));
        let err = Authenticated::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let mut parts = parts_with(None);
        let err = ClientContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Response envelopes and the API error taxonomy.
//!
//! # Shapes
//! - Enveloped: `{ success, data?, error?, errors?, message? }`
//! - Bare: the resource itself, or `{ error, errors? }` on failure
//!
//! Which shape a route speaks is fixed per route and recorded in the
//! contract table (`routes::contract_table`).

use std::borrow::Cow;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::security::FieldErrors;
use crate::store::StoreError;

/// Success envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    /// `{ success: true, message }` with no payload.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Which response shape a route speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Enveloped,
    Bare,
}

/// Marker placed in response extensions when a request failed internally.
///
/// The pipeline runner logs the detail with request context; the detail
/// never reaches the client.
#[derive(Debug, Clone)]
pub struct InternalFailure(pub String);

/// API errors with a fixed status per class.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(Cow<'static, str>),
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(Cow<'static, str>),
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    Unavailable(Cow<'static, str>),
    #[error("{public}")]
    Internal {
        public: Cow<'static, str>,
        detail: String,
    },
}

impl ApiError {
    pub fn not_found() -> Self {
        Self::NotFound("Not found".into())
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::Internal {
            public: "Internal server error".into(),
            detail: detail.to_string(),
        }
    }

    /// Replace the client-facing message of an internal error.
    pub fn public(self, message: &'static str) -> Self {
        match self {
            Self::Internal { detail, .. } => Self::Internal {
                public: message.into(),
                detail,
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self, style: ResponseStyle) -> Value {
        let mut body = match style {
            ResponseStyle::Enveloped => json!({ "success": false, "error": self.to_string() }),
            ResponseStyle::Bare => json!({ "error": self.to_string() }),
        };
        if let Self::Validation(errors) = self {
            body["errors"] = json!(errors);
        }
        body
    }

    /// Render in the given shape.
    pub fn render(self, style: ResponseStyle) -> Response {
        let mut response = (self.status(), Json(self.body(style))).into_response();
        match self {
            Self::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            Self::Internal { detail, .. } => {
                response.extensions_mut().insert(InternalFailure(detail));
            }
            _ => {}
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.render(ResponseStyle::Enveloped)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found").into()),
            StoreError::Conflict(msg) | StoreError::Rejected(msg) => Self::BadRequest(msg.into()),
            StoreError::Backend(detail) => Self::internal(detail),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::internal(err)
    }
}

/// Renders an [`ApiError`] in the bare `{ error }` shape.
#[derive(Debug)]
pub struct Legacy(pub ApiError);

impl IntoResponse for Legacy {
    fn into_response(self) -> Response {
        self.0.render(ResponseStyle::Bare)
    }
}

impl From<ApiError> for Legacy {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for Legacy {
    fn from(err: StoreError) -> Self {
        Self(err.into())
    }
}

impl From<AuthError> for Legacy {
    fn from(err: AuthError) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_per_class() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation(FieldErrors::default()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_enveloped_and_bare_shapes() {
        let enveloped = json_body(ApiError::Forbidden.render(ResponseStyle::Enveloped)).await;
        assert_eq!(enveloped, json!({ "success": false, "error": "Forbidden" }));

        let bare = json_body(ApiError::Forbidden.render(ResponseStyle::Bare)).await;
        assert_eq!(bare, json!({ "error": "Forbidden" }));
    }

    #[tokio::test]
    async fn test_validation_carries_field_errors() {
        let mut errors = FieldErrors::default();
        errors.add("email", "Invalid email address");
        let body = json_body(ApiError::Validation(errors).into_response()).await;
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["errors"]["email"][0], "Invalid email address");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 60 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let response = ApiError::internal("db exploded")
            .public("Failed to fetch orders")
            .render(ResponseStyle::Bare);
        let marker = response.extensions().get::<InternalFailure>().cloned();
        assert_eq!(marker.map(|m| m.0), Some("db exploded".to_string()));
        assert_eq!(json_body(response).await, json!({ "error": "Failed to fetch orders" }));
    }

    #[tokio::test]
    async fn test_success_envelope_omits_absent_fields() {
        let body = json_body(Envelope::ok(json!({ "id": 1 })).into_response()).await;
        assert_eq!(body, json!({ "success": true, "data": { "id": 1 } }));

        let body = json_body(Envelope::message_only("Signed out").into_response()).await;
        assert_eq!(body, json!({ "success": true, "message": "Signed out" }));
    }
}

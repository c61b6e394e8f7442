//! Body validation stage: parse, sanitize, validate.
//!
//! On success the handler sees only the cleaned body, both through
//! `RequestContext::validated` and as the request body itself.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{header, HeaderValue};
use serde_json::Value;

use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::pipeline::{Flow, Phase, RequestContext, Stage};
use crate::security::{sanitize_deep, Schema};

pub struct ValidateStage {
    schema: Schema,
    max_body_size: usize,
}

impl ValidateStage {
    pub fn new(schema: Schema, max_body_size: usize) -> Self {
        Self {
            schema,
            max_body_size,
        }
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn phase(&self) -> Phase {
        Phase::Validate
    }

    async fn before(&self, req: Request<Body>, ctx: &mut RequestContext) -> Flow {
        let (mut parts, body) = req.into_parts();

        let raw: Value = match to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, path = %ctx.path, error = %e, "Unreadable request body");
                return Flow::Halt(ctx.reject(ApiError::bad_request("Invalid request body")));
            }
        };

        match self.schema.validate(&sanitize_deep(&raw)) {
            Ok(clean) => {
                let bytes = match serde_json::to_vec(&clean) {
                    Ok(bytes) => bytes,
                    Err(e) => return Flow::Halt(ctx.reject(ApiError::internal(e))),
                };
                parts.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                ctx.validated = Some(clean);
                Flow::Continue(Request::from_parts(parts, Body::from(bytes)))
            }
            Err(errors) => {
                metrics::record_validation_failure();
                tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, %errors, "Validation failed");
                Flow::Halt(ctx.reject(ApiError::Validation(errors)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ResponseStyle;
    use crate::security::schemas;
    use axum::http::StatusCode;
    use serde_json::json;

    fn request(body: &str) -> (Request<Body>, RequestContext) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/signup")
            .body(Body::from(body.to_string()))
            .unwrap();
        let ctx = RequestContext::from_request(&req, ResponseStyle::Enveloped, false);
        (req, ctx)
    }

    async fn halted_json(flow: Flow) -> (StatusCode, Value) {
        match flow {
            Flow::Halt(response) => {
                let status = response.status();
                let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
                (status, serde_json::from_slice(&bytes).unwrap())
            }
            Flow::Continue(_) => panic!("expected a halt"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let stage = ValidateStage::new(schemas::signin(), 1024);
        let (req, mut ctx) = request("{not json");
        let (status, body) = halted_json(stage.before(req, &mut ctx).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "success": false, "error": "Invalid request body" }));
    }

    #[tokio::test]
    async fn test_oversized_body_is_400() {
        let stage = ValidateStage::new(schemas::signin(), 8);
        let (req, mut ctx) = request(r#"{"email":"ann@example.com","password":"x"}"#);
        let (status, _) = halted_json(stage.before(req, &mut ctx).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_fields_are_422() {
        let stage = ValidateStage::new(schemas::signup(), 1024);
        let (req, mut ctx) = request(r#"{"email":"nope","password":"Pass1!","name":"Ann"}"#);
        let (status, body) = halted_json(stage.before(req, &mut ctx).await).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["errors"]["email"][0], "Invalid email address");
        assert_eq!(body["errors"]["password"][0], "Password must be at least 8 characters");
    }

    #[tokio::test]
    async fn test_clean_body_replaces_raw_body() {
        let stage = ValidateStage::new(schemas::signup(), 1024);
        let (req, mut ctx) = request(
            r#"{"email":"ann@example.com","password":"Password123!","name":"<b>Ann</b>","role":"admin"}"#,
        );
        let req = match stage.before(req, &mut ctx).await {
            Flow::Continue(req) => req,
            Flow::Halt(_) => panic!("valid body must pass"),
        };

        let expected = json!({ "email": "ann@example.com", "password": "Password123!", "name": "Ann" });
        assert_eq!(ctx.validated.as_ref(), Some(&expected));

        let bytes = to_bytes(req.into_body(), usize::MAX).await.unwrap();
        let forwarded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(forwarded, expected, "unknown keys must be stripped");
    }
}

//! `GET /api/health`

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::http::AppState;

pub const HEALTH_TOKEN_HEADER: &str = "x-health-check-token";

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Store liveness. When a token is configured, callers must present it.
pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(expected) = state.config.health.token.as_deref() {
        let presented = headers.get(HEALTH_TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "status": "unauthorized" }))).into_response();
        }
    }

    if let Err(e) = state.health.ping().await {
        tracing::error!(error = %e, "Health check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": "Database connection failed",
                "timestamp": timestamp(),
            })),
        )
            .into_response();
    }

    Json(json!({
        "status": "healthy",
        "timestamp": timestamp(),
        "uptime": state.started.elapsed().as_secs_f64(),
        "version": env!("CARGO_PKG_VERSION"),
        "rateLimitStore": state.limiter.backend(),
    }))
    .into_response()
}

//! `GET /api/orders` (bare, paginated)

use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};

use crate::http::{validate_pagination, ApiError, AppState, Authenticated, Legacy, PageQuery};

pub async fn list(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, Legacy> {
    let page = validate_pagination(&query);
    let (orders, total) = state
        .orders
        .list_orders(session.user_id, page.window())
        .await
        .map_err(|e| ApiError::from(e).public("Failed to fetch orders"))?;

    Ok(Json(json!({
        "orders": orders,
        "pagination": page.meta(total),
    })))
}

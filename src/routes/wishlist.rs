//! `GET/POST/DELETE /api/wishlist` (bare)

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::{ApiError, AppState, Authenticated, Legacy, Valid};
use crate::store::{StoreError, WishlistEntry};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistBody {
    pub product_id: i64,
}

fn failure(public: &'static str) -> impl Fn(StoreError) -> Legacy {
    move |e| match e {
        StoreError::Backend(_) => ApiError::from(e).public(public).into(),
        other => other.into(),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
) -> Result<Json<Vec<WishlistEntry>>, Legacy> {
    let entries = state
        .wishlist
        .list_wishlist(session.user_id)
        .await
        .map_err(failure("Failed to fetch wishlist"))?;
    Ok(Json(entries))
}

pub async fn add(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Valid(body): Valid<WishlistBody>,
) -> Result<Json<WishlistEntry>, Legacy> {
    let entry = state
        .wishlist
        .add_to_wishlist(session.user_id, body.product_id)
        .await
        .map_err(failure("Failed to add to wishlist"))?;
    Ok(Json(entry))
}

pub async fn remove(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Valid(body): Valid<WishlistBody>,
) -> Result<Json<Value>, Legacy> {
    state
        .wishlist
        .remove_from_wishlist(session.user_id, body.product_id)
        .await
        .map_err(failure("Failed to remove from wishlist"))?;
    Ok(Json(json!({ "success": true })))
}

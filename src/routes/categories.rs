//! `GET /api/categories` (bare, cached)

use axum::extract::State;
use axum::Json;

use crate::http::{ApiError, AppState, Legacy};
use crate::store::CategorySummary;

pub const CACHE_KEY: &str = "categories";

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<CategorySummary>>, Legacy> {
    if let Some(categories) = state.cache.get::<Vec<CategorySummary>>(CACHE_KEY).await {
        return Ok(Json(categories));
    }

    let categories = state
        .categories
        .list_categories()
        .await
        .map_err(|e| ApiError::from(e).public("Failed to fetch categories"))?;
    state.cache.set(CACHE_KEY, &categories).await;
    Ok(Json(categories))
}

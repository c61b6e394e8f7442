//! Catalogue reads.
//!
//! Single products are served read-through from the cache under
//! `product:{id}`; writes elsewhere delete that key.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::{validate_pagination, ApiError, AppState, Envelope, Legacy, PageQuery};
use crate::store::{Product, ProductSummary};

pub const RELATED_LIMIT: usize = 4;

pub fn cache_key(id: i64) -> String {
    format!("product:{id}")
}

/// Ids arrive as text; anything that is not an id cannot name a product.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .ok()
        .filter(|id: &i64| *id > 0)
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category_id: Option<String>,
}

/// `GET /api/products` (enveloped, paginated)
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Envelope<Value>, ApiError> {
    let page = validate_pagination(&PageQuery {
        page: query.page,
        limit: query.limit,
    });
    let category_id = query.category_id.as_deref().and_then(|c| c.parse().ok());

    let (products, total) = state.products.list_products(page.window(), category_id).await?;
    Ok(Envelope::ok(json!({
        "products": products,
        "pagination": page.meta(total),
    })))
}

/// `GET /api/products/{id}` (enveloped, cached)
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<Product>, ApiError> {
    let id = parse_id(&id)?;
    let key = cache_key(id);
    if let Some(product) = state.cache.get::<Product>(&key).await {
        return Ok(Envelope::ok(product));
    }

    let product = state
        .products
        .find_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;
    state.cache.set(&key, &product).await;
    Ok(Envelope::ok(product))
}

/// `GET /api/products/{id}/related` (bare)
pub async fn related(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProductSummary>>, Legacy> {
    let id = parse_id(&id)?;
    let related = state
        .products
        .related_products(id, RELATED_LIMIT)
        .await
        .map_err(|e| ApiError::from(e).public("Failed to fetch related products"))?;
    Ok(Json(related.iter().map(Product::summary).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(parse_id("0").is_err());
        assert!(parse_id("abc").is_err());
        assert!(parse_id("-1").is_err());
    }
}

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::http::{validate_pagination, AdminSession, ApiError, AppState, Envelope, PageQuery, Valid};
use crate::routes::{categories, products};
use crate::store::{Category, NewCategory, NewProduct, Product, ProductPatch};

pub async fn list_products(
    State(state): State<AppState>,
    AdminSession(_): AdminSession,
    Query(query): Query<PageQuery>,
) -> Result<Envelope<Value>, ApiError> {
    let page = validate_pagination(&query);
    let (products, total) = state.products.list_products(page.window(), None).await?;
    Ok(Envelope::ok(json!({
        "products": products,
        "pagination": page.meta(total),
    })))
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Valid(product): Valid<NewProduct>,
) -> Result<(StatusCode, Envelope<Product>), ApiError> {
    let product = state.products.create_product(product).await?;
    state.cache.delete(categories::CACHE_KEY).await;
    tracing::info!(product_id = product.id, admin = %admin.email, "Product created");
    Ok((StatusCode::CREATED, Envelope::ok(product).with_message("Product created")))
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
    Valid(patch): Valid<ProductPatch>,
) -> Result<Envelope<Product>, ApiError> {
    let id = products::parse_id(&id)?;
    let product = state.products.update_product(id, patch).await?;
    state.cache.delete(&products::cache_key(id)).await;
    state.cache.delete(categories::CACHE_KEY).await;
    tracing::info!(product_id = id, admin = %admin.email, "Product updated");
    Ok(Envelope::ok(product).with_message("Product updated"))
}

pub async fn delete_product(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
) -> Result<Envelope<()>, ApiError> {
    let id = products::parse_id(&id)?;
    state.products.delete_product(id).await?;
    state.cache.delete(&products::cache_key(id)).await;
    state.cache.delete(categories::CACHE_KEY).await;
    tracing::info!(product_id = id, admin = %admin.email, "Product deleted");
    Ok(Envelope::message_only("Product deleted"))
}

pub async fn create_category(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Valid(category): Valid<NewCategory>,
) -> Result<(StatusCode, Envelope<Category>), ApiError> {
    let category = state.categories.create_category(category).await?;
    state.cache.delete(categories::CACHE_KEY).await;
    tracing::info!(category_id = category.id, admin = %admin.email, "Category created");
    Ok((StatusCode::CREATED, Envelope::ok(category).with_message("Category created")))
}

//! `POST /api/checkout` (enveloped, 201)

use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::http::{ApiError, AppState, Authenticated, Envelope, Valid};
use crate::routes::products;
use crate::store::{NewOrder, Order, OrderLine, ShippingAddress};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub email: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub items: Vec<OrderLine>,
}

pub async fn create(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Valid(body): Valid<CheckoutBody>,
) -> Result<(StatusCode, Envelope<Order>), ApiError> {
    let product_ids: Vec<i64> = body.items.iter().map(|line| line.product_id).collect();
    let order = state
        .orders
        .place_order(NewOrder {
            user_id: session.user_id,
            email: body.email,
            shipping: ShippingAddress {
                name: body.name,
                address: body.address,
                city: body.city,
                postal_code: body.postal_code,
                country: body.country,
            },
            lines: body.items,
        })
        .await?;

    // Stock changed
    for id in product_ids {
        state.cache.delete(&products::cache_key(id)).await;
    }

    tracing::info!(
        order_id = order.id,
        user_id = session.user_id,
        total = order.total,
        "Order placed"
    );
    Ok((StatusCode::CREATED, Envelope::ok(order).with_message("Order placed")))
}

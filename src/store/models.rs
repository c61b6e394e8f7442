//! Storefront entities and their write-side inputs.
//!
//! Field names serialize in camelCase to match the JSON clients already use.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub product_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category_id: Option<i64>,
    pub image_url: String,
    pub gallery: Vec<String>,
    pub discount_percentage: f64,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            title: self.title.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
            discount_percentage: self.discount_percentage,
            rating: self.rating,
        }
    }

    /// Unit price after the percentage discount, rounded to cents.
    pub fn sale_price(&self) -> f64 {
        round_cents(self.price * (100.0 - self.discount_percentage) / 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub image_url: String,
    pub discount_percentage: f64,
    pub rating: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category_id: Option<i64>,
    pub image_url: String,
    pub discount_percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
    pub discount_percentage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub status: OrderStatus,
    pub shipping: ShippingAddress,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub email: String,
    pub shipping: ShippingAddress,
    pub lines: Vec<OrderLine>,
}

impl NewOrder {
    /// Total quantity requested per product, summed across lines.
    pub fn demand(&self) -> BTreeMap<i64, u64> {
        let mut demand = BTreeMap::new();
        for line in &self.lines {
            *demand.entry(line.product_id).or_insert(0) += u64::from(line.quantity);
        }
        demand
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub created_at: DateTime<Utc>,
    pub product: ProductSummary,
}

/// Single-use token tied to an account (email verification, password reset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
    pub user_id: Option<i64>,
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_price_applies_discount() {
        let product = Product {
            id: 1,
            title: "Sponge".into(),
            description: None,
            price: 9.99,
            stock: 1,
            category_id: None,
            image_url: "https://cdn.example.com/s.png".into(),
            gallery: vec![],
            discount_percentage: 20.0,
            rating: 0.0,
            created_at: Utc::now(),
        };
        assert_eq!(product.sale_price(), 7.99);
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let user = User {
            id: 1,
            name: "Ann".into(),
            email: "ann@example.com".into(),
            password_hash: "secret".into(),
            role: "user".into(),
            image: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["email"], "ann@example.com");
    }

    #[test]
    fn test_demand_sums_lines_per_product() {
        let order = NewOrder {
            user_id: 1,
            email: "ann@example.com".into(),
            shipping: ShippingAddress {
                name: "Ann".into(),
                address: "1 Main St".into(),
                city: "Oslo".into(),
                postal_code: "0150".into(),
                country: "NO".into(),
            },
            lines: vec![
                OrderLine { product_id: 4, quantity: 1 },
                OrderLine { product_id: 9, quantity: 2 },
                OrderLine { product_id: 4, quantity: 3 },
            ],
        };
        let demand = order.demand();
        assert_eq!(demand.len(), 2);
        assert_eq!(demand[&4], 4);
        assert_eq!(demand[&9], 2);
    }
}

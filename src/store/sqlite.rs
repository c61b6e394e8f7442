//! SQLite storage over a sqlx pool.
//!
//! The schema lives in `migrations/` and is applied on connect. Order
//! placement and password resets run inside one transaction each; stock is
//! decremented with a guarded `UPDATE` so a concurrent order can never push
//! it below zero.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::store::models::*;
use crate::store::{
    CategoryRepository, HealthProbe, OrderRepository, ProductRepository, StoreError,
    TokenRepository, UserRepository, Window, WishlistRepository, INVALID_RESET_TOKEN,
    UNLINKED_RESET_TOKEN,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// `Conflict(message)` for unique-constraint violations, `Backend` otherwise.
fn conflict_or_backend(err: sqlx::Error, message: &str) -> StoreError {
    let unique = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        StoreError::Conflict(message.to_string())
    } else {
        StoreError::from(err)
    }
}

fn insufficient_stock(title: &str) -> StoreError {
    StoreError::Rejected(format!("Insufficient stock for '{title}'"))
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// An in-memory database lives only as long as its connection, so
    /// `sqlite::memory:` is served by a single connection that never idles out.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .idle_timeout(if in_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(in_memory, "SQLite store ready");
        Ok(Self { pool })
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderItem::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    image: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            image: row.image,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    title: String,
    description: Option<String>,
    price: f64,
    stock: i64,
    category_id: Option<i64>,
    image_url: String,
    gallery: Json<Vec<String>>,
    discount_percentage: f64,
    rating: f64,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            title: row.title,
            description: row.description,
            price: row.price,
            stock: row.stock,
            category_id: row.category_id,
            image_url: row.image_url,
            gallery: row.gallery.0,
            discount_percentage: row.discount_percentage,
            rating: row.rating,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    slug: String,
}

#[derive(Debug, FromRow)]
struct CategorySummaryRow {
    id: i64,
    name: String,
    slug: String,
    product_count: i64,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    email: String,
    status: String,
    ship_name: String,
    ship_address: String,
    ship_city: String,
    ship_postal_code: String,
    ship_country: String,
    total: f64,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            email: self.email,
            status: parse_status(&self.status)?,
            shipping: ShippingAddress {
                name: self.ship_name,
                address: self.ship_address,
                city: self.ship_city,
                postal_code: self.ship_postal_code,
                country: self.ship_country,
            },
            items,
            total: self.total,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    id: i64,
    product_id: i64,
    name: String,
    quantity: i64,
    unit_price: f64,
    image_url: String,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity)
            .map_err(|_| StoreError::Backend(format!("order item {} has quantity {}", row.id, row.quantity)))?;
        Ok(OrderItem {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            quantity,
            unit_price: row.unit_price,
            image_url: row.image_url,
        })
    }
}

#[derive(Debug, FromRow)]
struct WishlistRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    created_at: DateTime<Utc>,
    title: String,
    price: f64,
    image_url: String,
    discount_percentage: f64,
    rating: f64,
}

impl From<WishlistRow> for WishlistEntry {
    fn from(row: WishlistRow) -> Self {
        WishlistEntry {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            created_at: row.created_at,
            product: ProductSummary {
                id: row.product_id,
                title: row.title,
                price: row.price,
                image_url: row.image_url,
                discount_percentage: row.discount_percentage,
                rating: row.rating,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct TokenRow {
    expires: DateTime<Utc>,
    user_id: Option<i64>,
}

fn status_name(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Paid => "paid",
        OrderStatus::Shipped => "shipped",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn parse_status(value: &str) -> Result<OrderStatus, StoreError> {
    match value {
        "pending" => Ok(OrderStatus::Pending),
        "paid" => Ok(OrderStatus::Paid),
        "shipped" => Ok(OrderStatus::Shipped),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(StoreError::Backend(format!("unknown order status '{other}'"))),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, 'user', $4)
            RETURNING *
            "#,
        )
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map(User::from)
        .map_err(|e| conflict_or_backend(e, "An account with this email already exists"))
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET name = COALESCE($1, name), email = COALESCE($2, email)
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(patch.name)
        .bind(patch.email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or_backend(e, "Email already in use"))?
        .map(User::from)
        .ok_or(StoreError::NotFound("User"))
    }
}

#[async_trait]
impl ProductRepository for SqliteStore {
    async fn list_products(
        &self,
        window: Window,
        category_id: Option<i64>,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT * FROM products
            WHERE ($1 IS NULL OR category_id = $1)
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(category_id)
        .bind(to_i64(window.limit))
        .bind(to_i64(window.skip))
        .fetch_all(&self.pool)
        .await?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE ($1 IS NULL OR category_id = $1)",
        )
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((rows.into_iter().map(Product::from).collect(), total.max(0) as u64))
    }

    async fn find_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    async fn related_products(&self, id: i64, limit: usize) -> Result<Vec<Product>, StoreError> {
        let Some(product) = self.find_product(id).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT * FROM products
            WHERE id != $1 AND ($2 IS NULL OR category_id = $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(id)
        .bind(product.category_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        if let Some(category_id) = product.category_id {
            category_exists(&self.pool, category_id).await?;
        }
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            INSERT INTO products
                (title, description, price, stock, category_id, image_url, gallery,
                 discount_percentage, rating, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, '[]', $7, 0, $8)
            RETURNING *
            "#,
        )
        .bind(product.title)
        .bind(product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.category_id)
        .bind(product.image_url)
        .bind(product.discount_percentage.unwrap_or(0.0))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product, StoreError> {
        if let Some(category_id) = patch.category_id {
            category_exists(&self.pool, category_id).await?;
        }
        sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                price = COALESCE($3, price),
                stock = COALESCE($4, stock),
                category_id = COALESCE($5, category_id),
                image_url = COALESCE($6, image_url),
                discount_percentage = COALESCE($7, discount_percentage)
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.price)
        .bind(patch.stock)
        .bind(patch.category_id)
        .bind(patch.image_url)
        .bind(patch.discount_percentage)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Product::from)
        .ok_or(StoreError::NotFound("Product"))
    }

    async fn delete_product(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM wishlist WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::NotFound("Product"));
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn category_exists(pool: &SqlitePool, id: i64) -> Result<(), StoreError> {
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    found.map(|_| ()).ok_or(StoreError::NotFound("Category"))
}

#[async_trait]
impl CategoryRepository for SqliteStore {
    async fn list_categories(&self) -> Result<Vec<CategorySummary>, StoreError> {
        let rows = sqlx::query_as::<_, CategorySummaryRow>(
            r#"
            SELECT c.id, c.name, c.slug, COUNT(p.id) AS product_count
            FROM categories c
            LEFT JOIN products p ON p.category_id = c.id
            GROUP BY c.id, c.name, c.slug
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| CategorySummary {
                id: row.id,
                name: row.name,
                slug: row.slug,
                product_count: row.product_count.max(0) as u64,
            })
            .collect())
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        let conflict = format!("Category slug '{}' already exists", category.slug);
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING *",
        )
        .bind(category.name)
        .bind(category.slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_backend(e, &conflict))?;
        Ok(Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
        })
    }
}

#[async_trait]
impl OrderRepository for SqliteStore {
    async fn place_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Rolled back on any early return: the transaction is dropped uncommitted
        let mut products = BTreeMap::new();
        for (product_id, wanted) in order.demand() {
            // Write first so the transaction holds the write lock from the start
            let updated = sqlx::query(
                "UPDATE products SET stock = stock - $1 WHERE id = $2 AND stock >= $1",
            )
            .bind(to_i64(wanted))
            .bind(product_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            let product = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(Product::from)
                .ok_or(StoreError::NotFound("Product"))?;
            if updated == 0 {
                return Err(insufficient_stock(&product.title));
            }
            products.insert(product_id, product);
        }

        let mut total = 0.0;
        for line in &order.lines {
            if let Some(product) = products.get(&line.product_id) {
                total += product.sale_price() * f64::from(line.quantity);
            }
        }
        let total = round_cents(total);
        let status = OrderStatus::Pending;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders
                (user_id, email, status, ship_name, ship_address, ship_city,
                 ship_postal_code, ship_country, total, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(order.user_id)
        .bind(&order.email)
        .bind(status_name(status))
        .bind(&order.shipping.name)
        .bind(&order.shipping.address)
        .bind(&order.shipping.city)
        .bind(&order.shipping.postal_code)
        .bind(&order.shipping.country)
        .bind(total)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let Some(product) = products.get(&line.product_id) else {
                return Err(StoreError::NotFound("Product"));
            };
            let item = sqlx::query_as::<_, OrderItemRow>(
                r#"
                INSERT INTO order_items (order_id, product_id, name, quantity, unit_price, image_url)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, product_id, name, quantity, unit_price, image_url
                "#,
            )
            .bind(row.id)
            .bind(line.product_id)
            .bind(&product.title)
            .bind(i64::from(line.quantity))
            .bind(product.sale_price())
            .bind(&product.image_url)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem::try_from(item)?);
        }

        tx.commit().await?;
        row.into_order(items)
    }

    async fn list_orders(&self, user_id: i64, window: Window) -> Result<(Vec<Order>, u64), StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(to_i64(window.limit))
        .bind(to_i64(window.skip))
        .fetch_all(&self.pool)
        .await?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.order_items(row.id).await?;
            orders.push(row.into_order(items)?);
        }
        Ok((orders, total.max(0) as u64))
    }
}

#[async_trait]
impl WishlistRepository for SqliteStore {
    async fn list_wishlist(&self, user_id: i64) -> Result<Vec<WishlistEntry>, StoreError> {
        let rows = sqlx::query_as::<_, WishlistRow>(
            r#"
            SELECT w.id, w.user_id, w.product_id, w.created_at,
                   p.title, p.price, p.image_url, p.discount_percentage, p.rating
            FROM wishlist w
            JOIN products p ON p.id = w.product_id
            WHERE w.user_id = $1
            ORDER BY w.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WishlistEntry::from).collect())
    }

    async fn add_to_wishlist(&self, user_id: i64, product_id: i64) -> Result<WishlistEntry, StoreError> {
        let product = self
            .find_product(product_id)
            .await?
            .ok_or(StoreError::NotFound("Product"))?;
        let created_at = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO wishlist (user_id, product_id, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_backend(e, "Product already in wishlist"))?;
        Ok(WishlistEntry {
            id,
            user_id,
            product_id,
            created_at,
            product: product.summary(),
        })
    }

    async fn remove_from_wishlist(&self, user_id: i64, product_id: i64) -> Result<(), StoreError> {
        let removed = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(StoreError::NotFound("Wishlist item"));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for SqliteStore {
    async fn create_token(&self, token: VerificationToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO verification_tokens (token, identifier, expires, user_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(token.token)
        .bind(token.identifier)
        .bind(token.expires)
        .bind(token.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_backend(e, "Token already issued"))?;
        Ok(())
    }

    async fn reset_password(
        &self,
        token: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let record = sqlx::query_as::<_, TokenRow>(
            "SELECT expires, user_id FROM verification_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        let user_id = match record {
            Some(record) if record.expires >= now => record
                .user_id
                .ok_or_else(|| StoreError::Rejected(UNLINKED_RESET_TOKEN.into()))?,
            _ => return Err(StoreError::Rejected(INVALID_RESET_TOKEN.into())),
        };

        let updated = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::Rejected(UNLINKED_RESET_TOKEN.into()));
        }
        sqlx::query("DELETE FROM verification_tokens WHERE token = $1")
            .bind(token)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user_id)
    }
}

#[async_trait]
impl HealthProbe for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn new_product(title: &str, stock: i64, category_id: Option<i64>) -> NewProduct {
        NewProduct {
            title: title.into(),
            description: None,
            price: 10.0,
            stock,
            category_id,
            image_url: "https://cdn.example.com/p.png".into(),
            discount_percentage: None,
        }
    }

    fn order(lines: Vec<OrderLine>) -> NewOrder {
        NewOrder {
            user_id: 7,
            email: "ann@example.com".into(),
            shipping: ShippingAddress {
                name: "Ann".into(),
                address: "1 Main St".into(),
                city: "Oslo".into(),
                postal_code: "0150".into(),
                country: "NO".into(),
            },
            lines,
        }
    }

    #[tokio::test]
    async fn test_user_email_is_unique_ignoring_case() {
        let store = store().await;
        let user = NewUser {
            name: "Ann".into(),
            email: "ann@example.com".into(),
            password_hash: "h".into(),
        };
        let created = store.create_user(user.clone()).await.unwrap();
        assert_eq!(created.role, "user");

        let mut upper = user;
        upper.email = "ANN@example.com".into();
        assert!(matches!(store.create_user(upper).await, Err(StoreError::Conflict(_))));
        let found = store.find_user_by_email("Ann@Example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_place_order_commits_stock_items_and_total() {
        let store = store().await;
        let mut lamp = new_product("Lamp", 5, None);
        lamp.discount_percentage = Some(10.0);
        let lamp = store.create_product(lamp).await.unwrap();

        let placed = store
            .place_order(order(vec![
                OrderLine { product_id: lamp.id, quantity: 2 },
                OrderLine { product_id: lamp.id, quantity: 1 },
            ]))
            .await
            .unwrap();

        assert_eq!(placed.items.len(), 2);
        assert_eq!(placed.items[0].unit_price, 9.0);
        assert_eq!(placed.total, 27.0);
        assert_eq!(placed.status, OrderStatus::Pending);
        assert_eq!(store.find_product(lamp.id).await.unwrap().unwrap().stock, 2);

        let (orders, total) = store.list_orders(7, Window { skip: 0, limit: 10 }).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(orders[0].items.len(), 2);
        assert_eq!(orders[0].shipping.city, "Oslo");
    }

    #[tokio::test]
    async fn test_failed_order_rolls_back_every_line() {
        let store = store().await;
        let soap = store.create_product(new_product("Soap", 10, None)).await.unwrap();
        let brush = store.create_product(new_product("Brush", 1, None)).await.unwrap();

        let result = store
            .place_order(order(vec![
                OrderLine { product_id: soap.id, quantity: 3 },
                OrderLine { product_id: brush.id, quantity: 1 },
                OrderLine { product_id: brush.id, quantity: 1 },
            ]))
            .await;

        match result {
            Err(StoreError::Rejected(message)) => assert_eq!(message, "Insufficient stock for 'Brush'"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(store.find_product(soap.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(store.find_product(brush.id).await.unwrap().unwrap().stock, 1);
        let (_, total) = store.list_orders(7, Window { skip: 0, limit: 10 }).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_catalogue_queries() {
        let store = store().await;
        let bath = store
            .create_category(NewCategory { name: "Bath".into(), slug: "bath".into() })
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_category(NewCategory { name: "Bath 2".into(), slug: "bath".into() })
                .await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.create_product(new_product("Ghost", 1, Some(999))).await,
            Err(StoreError::NotFound("Category"))
        ));

        let tub = store.create_product(new_product("Tub", 1, Some(bath.id))).await.unwrap();
        let mat = store.create_product(new_product("Mat", 1, Some(bath.id))).await.unwrap();
        store.create_product(new_product("Pen", 1, None)).await.unwrap();

        let (page, total) = store
            .list_products(Window { skip: 0, limit: 10 }, Some(bath.id))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(page[0].id, mat.id);

        let related = store.related_products(tub.id, 4).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, mat.id);

        let categories = store.list_categories().await.unwrap();
        assert_eq!(categories[0].product_count, 2);

        let updated = store
            .update_product(tub.id, ProductPatch { stock: Some(9), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.stock, 9);
        assert_eq!(updated.title, "Tub");
    }

    #[tokio::test]
    async fn test_wishlist_and_product_delete() {
        let store = store().await;
        let mop = store.create_product(new_product("Mop", 1, None)).await.unwrap();

        store.add_to_wishlist(3, mop.id).await.unwrap();
        assert!(matches!(store.add_to_wishlist(3, mop.id).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.list_wishlist(3).await.unwrap()[0].product.title, "Mop");

        store.delete_product(mop.id).await.unwrap();
        assert!(store.list_wishlist(3).await.unwrap().is_empty());
        assert!(matches!(store.delete_product(mop.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.remove_from_wishlist(3, mop.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_password_in_one_transaction() {
        let store = store().await;
        let user = store
            .create_user(NewUser {
                name: "Ann".into(),
                email: "ann@example.com".into(),
                password_hash: "old".into(),
            })
            .await
            .unwrap();
        let now = Utc::now();
        store
            .create_token(VerificationToken {
                identifier: user.email.clone(),
                token: "t-1".into(),
                expires: now + chrono::Duration::hours(1),
                user_id: Some(user.id),
            })
            .await
            .unwrap();
        store
            .create_token(VerificationToken {
                identifier: user.email.clone(),
                token: "t-old".into(),
                expires: now - chrono::Duration::hours(1),
                user_id: Some(user.id),
            })
            .await
            .unwrap();

        let err = store.reset_password("t-old", "x".into(), now).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_RESET_TOKEN);

        assert_eq!(store.reset_password("t-1", "new".into(), now).await.unwrap(), user.id);
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().password_hash, "new");
        assert!(store.reset_password("t-1", "again".into(), now).await.is_err());
    }

    #[tokio::test]
    async fn test_ping() {
        store().await.ping().await.unwrap();
    }
}

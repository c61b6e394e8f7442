//! In-process storage.
//!
//! All tables sit behind one `RwLock`, so every mutation (order placement
//! in particular) is applied atomically with respect to other requests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::models::*;
use crate::store::{
    CategoryRepository, HealthProbe, OrderRepository, ProductRepository, StoreError,
    TokenRepository, UserRepository, Window, WishlistRepository, INVALID_RESET_TOKEN,
    UNLINKED_RESET_TOKEN,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    products: BTreeMap<i64, Product>,
    categories: BTreeMap<i64, Category>,
    orders: BTreeMap<i64, Order>,
    wishlist: Vec<(i64, i64, i64, DateTime<Utc>)>,
    tokens: BTreeMap<String, VerificationToken>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders recorded, across all users.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Outstanding verification tokens issued for `identifier`.
    pub async fn tokens_for(&self, identifier: &str) -> Vec<VerificationToken> {
        self.tables
            .read()
            .await
            .tokens
            .values()
            .filter(|t| t.identifier.eq_ignore_ascii_case(identifier))
            .cloned()
            .collect()
    }
}

fn page<T: Clone>(items: &[T], window: Window) -> Vec<T> {
    items
        .iter()
        .skip(window.skip as usize)
        .take(window.limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict(
                "An account with this email already exists".into(),
            ));
        }
        let id = tables.next_id();
        let created = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: "user".into(),
            image: None,
            created_at: Utc::now(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &patch.email {
            let taken = tables
                .users
                .values()
                .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email));
            if taken {
                return Err(StoreError::Conflict("Email already in use".into()));
            }
        }
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        Ok(user.clone())
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list_products(
        &self,
        window: Window,
        category_id: Option<i64>,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let tables = self.tables.read().await;
        let matching: Vec<Product> = tables
            .products
            .values()
            .rev()
            .filter(|p| category_id.is_none() || p.category_id == category_id)
            .cloned()
            .collect();
        Ok((page(&matching, window), matching.len() as u64))
    }

    async fn find_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn related_products(&self, id: i64, limit: usize) -> Result<Vec<Product>, StoreError> {
        let tables = self.tables.read().await;
        let Some(product) = tables.products.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(tables
            .products
            .values()
            .rev()
            .filter(|p| p.id != id)
            .filter(|p| product.category_id.is_none() || p.category_id == product.category_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(category_id) = product.category_id {
            if !tables.categories.contains_key(&category_id) {
                return Err(StoreError::NotFound("Category"));
            }
        }
        let id = tables.next_id();
        let created = Product {
            id,
            title: product.title,
            description: product.description,
            price: product.price,
            stock: product.stock,
            category_id: product.category_id,
            image_url: product.image_url,
            gallery: Vec::new(),
            discount_percentage: product.discount_percentage.unwrap_or(0.0),
            rating: 0.0,
            created_at: Utc::now(),
        };
        tables.products.insert(id, created.clone());
        Ok(created)
    }

    async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(category_id) = patch.category_id {
            if !tables.categories.contains_key(&category_id) {
                return Err(StoreError::NotFound("Category"));
            }
        }
        let product = tables.products.get_mut(&id).ok_or(StoreError::NotFound("Product"))?;
        if let Some(title) = patch.title {
            product.title = title;
        }
        if let Some(description) = patch.description {
            product.description = Some(description);
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(stock) = patch.stock {
            product.stock = stock;
        }
        if let Some(category_id) = patch.category_id {
            product.category_id = Some(category_id);
        }
        if let Some(image_url) = patch.image_url {
            product.image_url = image_url;
        }
        if let Some(discount) = patch.discount_percentage {
            product.discount_percentage = discount;
        }
        Ok(product.clone())
    }

    async fn delete_product(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.products.remove(&id).ok_or(StoreError::NotFound("Product"))?;
        tables.wishlist.retain(|(_, _, product_id, _)| *product_id != id);
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<CategorySummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<CategorySummary> = tables
            .categories
            .values()
            .map(|c| CategorySummary {
                id: c.id,
                name: c.name.clone(),
                slug: c.slug.clone(),
                product_count: tables
                    .products
                    .values()
                    .filter(|p| p.category_id == Some(c.id))
                    .count() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.categories.values().any(|c| c.slug == category.slug) {
            return Err(StoreError::Conflict(format!(
                "Category slug '{}' already exists",
                category.slug
            )));
        }
        let id = tables.next_id();
        let created = Category {
            id,
            name: category.name,
            slug: category.slug,
        };
        tables.categories.insert(id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn place_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tables = self.tables.write().await;

        // Check the summed demand per product before touching stock
        let demand = order.demand();
        for (product_id, wanted) in &demand {
            let product = tables
                .products
                .get(product_id)
                .ok_or(StoreError::NotFound("Product"))?;
            if product.stock < 0 || (product.stock as u64) < *wanted {
                return Err(StoreError::Rejected(format!(
                    "Insufficient stock for '{}'",
                    product.title
                )));
            }
        }

        let mut items = Vec::with_capacity(order.lines.len());
        let mut total = 0.0;
        for line in &order.lines {
            let Some(stored) = tables.products.get_mut(&line.product_id) else {
                return Err(StoreError::NotFound("Product"));
            };
            stored.stock -= i64::from(line.quantity);
            let product = stored.clone();
            let unit_price = product.sale_price();
            total += unit_price * f64::from(line.quantity);
            let item_id = tables.next_id();
            items.push(OrderItem {
                id: item_id,
                product_id: line.product_id,
                name: product.title,
                quantity: line.quantity,
                unit_price,
                image_url: product.image_url,
            });
        }

        let id = tables.next_id();
        let created = Order {
            id,
            user_id: order.user_id,
            email: order.email,
            status: OrderStatus::Pending,
            shipping: order.shipping,
            items,
            total: round_cents(total),
            created_at: Utc::now(),
        };
        tables.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn list_orders(&self, user_id: i64, window: Window) -> Result<(Vec<Order>, u64), StoreError> {
        let tables = self.tables.read().await;
        let mine: Vec<Order> = tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok((page(&mine, window), mine.len() as u64))
    }
}

#[async_trait]
impl WishlistRepository for MemoryStore {
    async fn list_wishlist(&self, user_id: i64) -> Result<Vec<WishlistEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .wishlist
            .iter()
            .rev()
            .filter(|(_, owner, _, _)| *owner == user_id)
            .filter_map(|(id, owner, product_id, created_at)| {
                tables.products.get(product_id).map(|p| WishlistEntry {
                    id: *id,
                    user_id: *owner,
                    product_id: *product_id,
                    created_at: *created_at,
                    product: p.summary(),
                })
            })
            .collect())
    }

    async fn add_to_wishlist(&self, user_id: i64, product_id: i64) -> Result<WishlistEntry, StoreError> {
        let mut tables = self.tables.write().await;
        let summary = tables
            .products
            .get(&product_id)
            .map(Product::summary)
            .ok_or(StoreError::NotFound("Product"))?;
        if tables
            .wishlist
            .iter()
            .any(|(_, owner, pid, _)| *owner == user_id && *pid == product_id)
        {
            return Err(StoreError::Conflict("Product already in wishlist".into()));
        }
        let id = tables.next_id();
        let created_at = Utc::now();
        tables.wishlist.push((id, user_id, product_id, created_at));
        Ok(WishlistEntry {
            id,
            user_id,
            product_id,
            created_at,
            product: summary,
        })
    }

    async fn remove_from_wishlist(&self, user_id: i64, product_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.wishlist.len();
        tables
            .wishlist
            .retain(|(_, owner, pid, _)| !(*owner == user_id && *pid == product_id));
        if tables.wishlist.len() == before {
            return Err(StoreError::NotFound("Wishlist item"));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn create_token(&self, token: VerificationToken) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tokens.contains_key(&token.token) {
            return Err(StoreError::Conflict("Token already issued".into()));
        }
        tables.tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn reset_password(
        &self,
        token: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let record = match tables.tokens.get(token) {
            Some(record) if record.expires >= now => record.clone(),
            _ => return Err(StoreError::Rejected(INVALID_RESET_TOKEN.into())),
        };
        let user = record
            .user_id
            .and_then(|id| tables.users.get_mut(&id))
            .ok_or_else(|| StoreError::Rejected(UNLINKED_RESET_TOKEN.into()))?;
        user.password_hash = password_hash;
        let user_id = user.id;
        tables.tokens.remove(token);
        Ok(user_id)
    }
}

#[async_trait]
impl HealthProbe for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _tables = self.tables.read().await;
        Ok(())
    }
}

//! Postgres-backed store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{slugify, Store, StoreError, StoreResult};
use crate::domain::{OrderStatus, TransitionOutcome};
use crate::models::*;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}

#[async_trait]
impl Store for PgStore {
    // -- accounts ------------------------------------------------------------

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, name, password_hash, phone, address, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'user', NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(&new.phone)
        .bind(&new.address)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET name = COALESCE($2, name), phone = COALESCE($3, phone), \
             address = COALESCE($4, address), avatar = COALESCE($5, avatar), updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.phone)
        .bind(&patch.address)
        .bind(&patch.avatar)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn record_login_event(&self, event: NewLoginEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO login_events (id, user_id, ip, user_agent, device, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(event.user_id)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(&event.device)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn login_events_detailed(&self) -> StoreResult<Vec<LoginEventWithUser>> {
        let events = sqlx::query_as::<_, LoginEvent>(
            "SELECT * FROM login_events ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        let user_ids: Vec<Uuid> = events.iter().map(|e| e.user_id).collect();
        let users = self.users_by_ids(&user_ids).await?;
        Ok(events
            .into_iter()
            .filter_map(|event| {
                let user = users.get(&event.user_id)?.clone();
                Some(LoginEventWithUser { event, user })
            })
            .collect())
    }

    async fn login_events_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<LoginEvent>> {
        Ok(sqlx::query_as::<_, LoginEvent>(
            "SELECT * FROM login_events WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token, expires_at, used, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn password_reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>> {
        Ok(sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn mark_reset_token_used(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- catalog -------------------------------------------------------------

    async fn products(&self) -> StoreResult<Vec<Product>> {
        Ok(
            sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn products_by_category(&self, category: &str) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE category = $1 ORDER BY created_at DESC",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn featured_products(&self) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_featured ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn search_products(&self, query: &str) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE title ILIKE $1 ORDER BY created_at DESC LIMIT 20",
        )
        .bind(format!("%{query}%"))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn recommended_products(&self, id: Uuid) -> StoreResult<Vec<Product>> {
        let same_category = sqlx::query_as::<_, Product>(
            "SELECT * FROM products \
             WHERE category = (SELECT category FROM products WHERE id = $1) AND id <> $1 \
             ORDER BY rating DESC, downloads DESC LIMIT 8",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        if !same_category.is_empty() {
            return Ok(same_category);
        }
        Ok(sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_featured AND id <> $1 ORDER BY rating DESC LIMIT 8",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_product(&self, new: NewProduct) -> StoreResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (id, title, description, short_description, category, price, \
             image, author, rating, downloads, review_count, stock_count, is_featured, tags, \
             license_type, version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, 0, $9, $10, $11, $12, $13, NOW()) \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.short_description)
        .bind(&new.category)
        .bind(new.price)
        .bind(&new.image)
        .bind(&new.author)
        .bind(new.stock_count)
        .bind(new.is_featured)
        .bind(&new.tags)
        .bind(&new.license_type)
        .bind(&new.version)
        .fetch_one(&self.pool)
        .await?;
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> StoreResult<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "UPDATE products SET title = COALESCE($2, title), \
             description = COALESCE($3, description), \
             short_description = COALESCE($4, short_description), \
             category = COALESCE($5, category), price = COALESCE($6, price), \
             image = COALESCE($7, image), author = COALESCE($8, author), \
             stock_count = COALESCE($9, stock_count), is_featured = COALESCE($10, is_featured), \
             tags = COALESCE($11, tags), license_type = COALESCE($12, license_type), \
             version = COALESCE($13, version) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(&patch.short_description)
        .bind(&patch.category)
        .bind(patch.price)
        .bind(&patch.image)
        .bind(&patch.author)
        .bind(patch.stock_count)
        .bind(patch.is_featured)
        .bind(&patch.tags)
        .bind(&patch.license_type)
        .bind(&patch.version)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        Ok(
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn categories_with_counts(&self) -> StoreResult<Vec<CategoryWithCount>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM products GROUP BY category")
                .fetch_all(&self.pool)
                .await?;
        let counts: HashMap<String, i64> = counts.into_iter().collect();
        Ok(categories
            .into_iter()
            .map(|category| {
                let product_count = counts.get(&category.name).copied().unwrap_or(0);
                CategoryWithCount { category, product_count }
            })
            .collect())
    }

    async fn category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(
            sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_category(&self, new: NewCategory) -> StoreResult<Category> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, slug, description, image, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(slugify(&new.name))
        .bind(&new.description)
        .bind(&new.image)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Uuid,
        patch: CategoryPatch,
    ) -> StoreResult<Option<Category>> {
        let slug = patch.name.as_deref().map(slugify);
        Ok(sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
             description = COALESCE($4, description), image = COALESCE($5, image) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&slug)
        .bind(&patch.description)
        .bind(&patch.image)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- cart & wishlist -----------------------------------------------------

    async fn cart_lines(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>> {
        let items = sqlx::query_as::<_, CartItem>(
            "SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let mut products = self.products_by_ids(&ids).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                products
                    .remove(&item.product_id)
                    .map(|product| CartLine { item, product })
            })
            .collect())
    }

    async fn cart_item(&self, id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(
            sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn upsert_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> StoreResult<CartItem> {
        let item = sqlx::query_as::<_, CartItem>(
            "INSERT INTO cart_items (id, user_id, product_id, quantity, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             ON CONFLICT (user_id, product_id) \
             DO UPDATE SET quantity = cart_items.quantity + $4 RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    async fn set_cart_quantity(&self, id: Uuid, quantity: i32) -> StoreResult<Option<CartItem>> {
        Ok(sqlx::query_as::<_, CartItem>(
            "UPDATE cart_items SET quantity = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn remove_cart_item(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn carts_with_totals(&self) -> StoreResult<Vec<CartSummary>> {
        let items =
            sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.products_by_ids(&product_ids).await?;
        let user_ids: Vec<Uuid> = items.iter().map(|i| i.user_id).collect();
        let users = self.users_by_ids(&user_ids).await?;

        let mut summaries: Vec<CartSummary> = Vec::new();
        let mut slots: HashMap<Uuid, usize> = HashMap::new();
        for item in items {
            let Some(product) = products.get(&item.product_id).cloned() else {
                continue;
            };
            let Some(user) = users.get(&item.user_id) else {
                continue;
            };
            let slot = *slots.entry(user.id).or_insert_with(|| {
                summaries.push(CartSummary {
                    user: user.clone(),
                    items: Vec::new(),
                    total_value: Decimal::ZERO,
                });
                summaries.len() - 1
            });
            summaries[slot].total_value += product.price * Decimal::from(item.quantity);
            summaries[slot].items.push(CartLine { item, product });
        }
        for summary in &mut summaries {
            summary.total_value = summary.total_value.round_dp(2);
        }
        Ok(summaries)
    }

    async fn wishlist_lines(&self, user_id: Uuid) -> StoreResult<Vec<WishlistLine>> {
        let items = sqlx::query_as::<_, WishlistItem>(
            "SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let mut products = self.products_by_ids(&ids).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                products
                    .remove(&item.product_id)
                    .map(|product| WishlistLine { item, product })
            })
            .collect())
    }

    async fn wishlist_item(&self, id: Uuid) -> StoreResult<Option<WishlistItem>> {
        Ok(
            sqlx::query_as::<_, WishlistItem>("SELECT * FROM wishlist_items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<WishlistItem> {
        let item = sqlx::query_as::<_, WishlistItem>(
            "INSERT INTO wishlist_items (id, user_id, product_id, created_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    async fn remove_wishlist_item(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM wishlist_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- orders & payments ---------------------------------------------------

    async fn create_order_with_items(
        &self,
        new: NewOrder,
        items: &[NewOrderItem],
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (id, user_id, total_amount, status, payment_intent_id, created_at) \
             VALUES ($1, $2, $3, 'pending', $4, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new.user_id)
        .bind(new.total_amount)
        .bind(&new.payment_intent_id)
        .fetch_one(&mut *tx)
        .await?;
        for item in items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, price, quantity) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn order_by_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        Ok(
            sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE payment_intent_id = $1")
                .bind(payment_intent_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        Ok(sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let items =
            sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.products_by_ids(&ids).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let product = products.get(&item.product_id).cloned();
                OrderLine { item, product }
            })
            .collect())
    }

    async fn orders_with_users(&self) -> StoreResult<Vec<OrderWithUser>> {
        let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        let user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
        let users = self.users_by_ids(&user_ids).await?;
        Ok(orders
            .into_iter()
            .filter_map(|order| {
                let user = users.get(&order.user_id)?.clone();
                Some(OrderWithUser { order, user })
            })
            .collect())
    }

    async fn complete_order(&self, order_id: Uuid) -> StoreResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;
        let swapped =
            sqlx::query("UPDATE orders SET status = 'completed' WHERE id = $1 AND status = 'pending'")
                .bind(order_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        if swapped == 0 {
            let status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                    .bind(order_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.commit().await?;
            return match status {
                Some((s,)) => Ok(match OrderStatus::parse(&s) {
                    Some(OrderStatus::Completed) => TransitionOutcome::AlreadyCompleted,
                    _ => TransitionOutcome::AlreadyFailed,
                }),
                None => Err(StoreError::NotFound("Order")),
            };
        }
        let items: Vec<(Uuid, i32)> =
            sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&mut *tx)
                .await?;
        for (product_id, quantity) in items {
            sqlx::query(
                "UPDATE products SET stock_count = GREATEST(0, stock_count - $2), \
                 downloads = downloads + $2 WHERE id = $1",
            )
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(TransitionOutcome::Applied)
    }

    async fn fail_order(&self, order_id: Uuid) -> StoreResult<TransitionOutcome> {
        let swapped =
            sqlx::query("UPDATE orders SET status = 'failed' WHERE id = $1 AND status = 'pending'")
                .bind(order_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if swapped == 1 {
            return Ok(TransitionOutcome::Applied);
        }
        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        match status {
            Some((s,)) => Ok(match OrderStatus::parse(&s) {
                Some(OrderStatus::Completed) => TransitionOutcome::AlreadyCompleted,
                _ => TransitionOutcome::AlreadyFailed,
            }),
            None => Err(StoreError::NotFound("Order")),
        }
    }

    async fn has_user_purchased(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<bool> {
        let (purchased,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM orders o \
             JOIN order_items oi ON oi.order_id = o.id \
             WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = 'completed')",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(purchased)
    }

    async fn record_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (id, order_id, user_id, provider, provider_payment_id, \
             provider_order_id, amount, currency, status, created_at) \
             VALUES ($1, $2, $3, 'razorpay', $4, $5, $6, $7, $8, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new.order_id)
        .bind(new.user_id)
        .bind(&new.provider_payment_id)
        .bind(&new.provider_order_id)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(&new.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(payment)
    }

    // -- reviews -------------------------------------------------------------

    async fn product_reviews(&self, product_id: Uuid) -> StoreResult<Vec<ProductReview>> {
        let authors: HashMap<Uuid, ReviewAuthor> = sqlx::query_as::<_, ReviewAuthor>(
            "SELECT DISTINCT u.id, u.name, u.avatar FROM reviews r \
             JOIN users u ON u.id = r.user_id WHERE r.product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|author| (author.id, author))
        .collect();
        let reviews = sqlx::query_as::<_, Review>(
            "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews
            .into_iter()
            .filter_map(|review| {
                authors
                    .get(&review.user_id)
                    .cloned()
                    .map(|user| ProductReview { review, user })
            })
            .collect())
    }

    async fn user_product_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "SELECT * FROM reviews WHERE user_id = $1 AND product_id = $2 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_review(&self, new: NewReview) -> StoreResult<Review> {
        let mut tx = self.pool.begin().await?;
        let review = sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (id, product_id, user_id, rating, comment, \
             is_verified_purchase, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new.product_id)
        .bind(new.user_id)
        .bind(new.rating)
        .bind(&new.comment)
        .bind(new.is_verified_purchase)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE products SET \
             rating = (SELECT ROUND(AVG(rating)::numeric, 2) FROM reviews WHERE product_id = $1), \
             review_count = (SELECT COUNT(*) FROM reviews WHERE product_id = $1) \
             WHERE id = $1",
        )
        .bind(new.product_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(review)
    }

    // -- marketing -----------------------------------------------------------

    async fn active_deals(&self) -> StoreResult<Vec<Deal>> {
        Ok(sqlx::query_as::<_, Deal>(
            "SELECT * FROM deals WHERE is_active AND start_date <= NOW() AND end_date >= NOW() \
             ORDER BY end_date",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn deal(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        Ok(sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn deal_by_code(&self, code: &str) -> StoreResult<Option<Deal>> {
        Ok(
            sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE LOWER(code) = LOWER($1)")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn deals(&self) -> StoreResult<Vec<Deal>> {
        Ok(
            sqlx::query_as::<_, Deal>("SELECT * FROM deals ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_deal(&self, new: NewDeal) -> StoreResult<Deal> {
        let deal = sqlx::query_as::<_, Deal>(
            "INSERT INTO deals (id, title, description, discount_percent, code, start_date, \
             end_date, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.discount_percent)
        .bind(&new.code)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(deal)
    }

    async fn update_deal(&self, id: Uuid, patch: DealPatch) -> StoreResult<Option<Deal>> {
        Ok(sqlx::query_as::<_, Deal>(
            "UPDATE deals SET title = COALESCE($2, title), \
             description = COALESCE($3, description), \
             discount_percent = COALESCE($4, discount_percent), \
             code = COALESCE($5, code), \
             start_date = COALESCE($6, start_date), end_date = COALESCE($7, end_date), \
             is_active = COALESCE($8, is_active) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.discount_percent)
        .bind(&patch.code)
        .bind(patch.start_date)
        .bind(patch.end_date)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_deal(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM deals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn visible_testimonials(&self) -> StoreResult<Vec<Testimonial>> {
        Ok(sqlx::query_as::<_, Testimonial>(
            "SELECT * FROM testimonials WHERE is_visible ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn testimonials(&self) -> StoreResult<Vec<Testimonial>> {
        Ok(
            sqlx::query_as::<_, Testimonial>("SELECT * FROM testimonials ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_testimonial(&self, new: NewTestimonial) -> StoreResult<Testimonial> {
        let testimonial = sqlx::query_as::<_, Testimonial>(
            "INSERT INTO testimonials (id, name, role, avatar, rating, content, is_verified, \
             is_visible, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(&new.role)
        .bind(&new.avatar)
        .bind(new.rating)
        .bind(&new.content)
        .bind(new.is_verified)
        .bind(new.is_visible)
        .fetch_one(&self.pool)
        .await?;
        Ok(testimonial)
    }

    async fn update_testimonial(
        &self,
        id: Uuid,
        patch: TestimonialPatch,
    ) -> StoreResult<Option<Testimonial>> {
        Ok(sqlx::query_as::<_, Testimonial>(
            "UPDATE testimonials SET is_visible = COALESCE($2, is_visible), \
             is_verified = COALESCE($3, is_verified), content = COALESCE($4, content) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch.is_visible)
        .bind(patch.is_verified)
        .bind(&patch.content)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_testimonial(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM testimonials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_announcements(&self) -> StoreResult<Vec<Announcement>> {
        Ok(sqlx::query_as::<_, Announcement>(
            "SELECT * FROM announcements WHERE is_active ORDER BY priority DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn announcements(&self) -> StoreResult<Vec<Announcement>> {
        Ok(sqlx::query_as::<_, Announcement>(
            "SELECT * FROM announcements ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_announcement(&self, new: NewAnnouncement) -> StoreResult<Announcement> {
        let announcement = sqlx::query_as::<_, Announcement>(
            "INSERT INTO announcements (id, content, link, type, is_active, priority, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.content)
        .bind(&new.link)
        .bind(&new.kind)
        .bind(new.is_active)
        .bind(new.priority)
        .fetch_one(&self.pool)
        .await?;
        Ok(announcement)
    }

    async fn update_announcement(
        &self,
        id: Uuid,
        patch: AnnouncementPatch,
    ) -> StoreResult<Option<Announcement>> {
        Ok(sqlx::query_as::<_, Announcement>(
            "UPDATE announcements SET content = COALESCE($2, content), \
             link = COALESCE($3, link), type = COALESCE($4, type), \
             is_active = COALESCE($5, is_active), priority = COALESCE($6, priority) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.content)
        .bind(&patch.link)
        .bind(&patch.kind)
        .bind(patch.is_active)
        .bind(patch.priority)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_announcement(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM announcements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribe_newsletter(&self, email: &str) -> StoreResult<NewsletterSubscriber> {
        let subscriber = sqlx::query_as::<_, NewsletterSubscriber>(
            "INSERT INTO newsletter_subscribers (id, email, is_active, created_at) \
             VALUES ($1, $2, TRUE, NOW()) \
             ON CONFLICT (email) DO UPDATE SET is_active = TRUE RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscriber)
    }

    async fn newsletter_subscribers(&self) -> StoreResult<Vec<NewsletterSubscriber>> {
        Ok(sqlx::query_as::<_, NewsletterSubscriber>(
            "SELECT * FROM newsletter_subscribers WHERE is_active ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_product_request(&self, new: NewProductRequest) -> StoreResult<ProductRequest> {
        let request = sqlx::query_as::<_, ProductRequest>(
            "INSERT INTO product_requests (id, product_name, email, message, status, created_at) \
             VALUES ($1, $2, $3, $4, 'pending', NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.product_name)
        .bind(&new.email)
        .bind(&new.message)
        .fetch_one(&self.pool)
        .await?;
        Ok(request)
    }

    async fn product_requests(&self, status: Option<&str>) -> StoreResult<Vec<ProductRequest>> {
        Ok(sqlx::query_as::<_, ProductRequest>(
            "SELECT * FROM product_requests \
             WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_product_request_status(
        &self,
        id: Uuid,
        status: &str,
    ) -> StoreResult<Option<ProductRequest>> {
        Ok(sqlx::query_as::<_, ProductRequest>(
            "UPDATE product_requests SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?)
    }
}

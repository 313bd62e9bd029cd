//! In-memory store. Backs tests and credential-less development runs.
//!
//! A single `RwLock` guards all tables, so guarded transitions
//! (`complete_order`, `fail_order`) check and mutate under one write lock,
//! matching the transactional semantics of the Postgres store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{slugify, Store, StoreError, StoreResult};
use crate::domain::{round2, OrderStatus, TransitionOutcome};
use crate::models::*;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    login_events: Vec<LoginEvent>,
    reset_tokens: Vec<PasswordResetToken>,
    products: HashMap<Uuid, Product>,
    categories: HashMap<Uuid, Category>,
    cart_items: HashMap<Uuid, CartItem>,
    wishlist: HashMap<Uuid, WishlistItem>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    payments: Vec<Payment>,
    reviews: Vec<Review>,
    deals: HashMap<Uuid, Deal>,
    testimonials: HashMap<Uuid, Testimonial>,
    announcements: HashMap<Uuid, Announcement>,
    newsletter: Vec<NewsletterSubscriber>,
    product_requests: HashMap<Uuid, ProductRequest>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
    rows
}

#[async_trait]
impl Store for MemoryStore {
    // -- accounts ------------------------------------------------------------

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            phone: new.phone,
            address: new.address,
            role: "user".to_string(),
            avatar: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.write().unwrap().users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.read().unwrap().users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.users.get_mut(&id).map(|user| {
            if let Some(name) = patch.name {
                user.name = name;
            }
            if let Some(phone) = patch.phone {
                user.phone = Some(phone);
            }
            if let Some(address) = patch.address {
                user.address = Some(address);
            }
            if let Some(avatar) = patch.avatar {
                user.avatar = Some(avatar);
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        if let Some(user) = self.inner.write().unwrap().users.get_mut(&id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        let users = self.inner.read().unwrap().users.values().cloned().collect();
        Ok(newest_first(users, |u| u.created_at))
    }

    async fn record_login_event(&self, event: NewLoginEvent) -> StoreResult<()> {
        self.inner.write().unwrap().login_events.push(LoginEvent {
            id: Uuid::now_v7(),
            user_id: event.user_id,
            ip: event.ip,
            user_agent: event.user_agent,
            device: event.device,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn login_events_detailed(&self) -> StoreResult<Vec<LoginEventWithUser>> {
        let inner = self.inner.read().unwrap();
        let detailed = inner
            .login_events
            .iter()
            .filter_map(|event| {
                let user = inner.users.get(&event.user_id)?.clone();
                Some(LoginEventWithUser {
                    event: event.clone(),
                    user,
                })
            })
            .collect();
        Ok(newest_first(detailed, |d| d.event.created_at))
    }

    async fn login_events_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<LoginEvent>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .login_events
            .iter()
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect())
    }

    async fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.write().unwrap().reset_tokens.push(PasswordResetToken {
            id: Uuid::now_v7(),
            user_id,
            token: token.to_string(),
            expires_at,
            used: false,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn password_reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .reset_tokens
            .iter()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn mark_reset_token_used(&self, id: Uuid) -> StoreResult<()> {
        if let Some(token) = self
            .inner
            .write()
            .unwrap()
            .reset_tokens
            .iter_mut()
            .find(|t| t.id == id)
        {
            token.used = true;
        }
        Ok(())
    }

    // -- catalog -------------------------------------------------------------

    async fn products(&self) -> StoreResult<Vec<Product>> {
        let products = self.inner.read().unwrap().products.values().cloned().collect();
        Ok(newest_first(products, |p| p.created_at))
    }

    async fn products_by_category(&self, category: &str) -> StoreResult<Vec<Product>> {
        let products = self
            .inner
            .read()
            .unwrap()
            .products
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect();
        Ok(newest_first(products, |p| p.created_at))
    }

    async fn featured_products(&self) -> StoreResult<Vec<Product>> {
        let products = self
            .inner
            .read()
            .unwrap()
            .products
            .values()
            .filter(|p| p.is_featured)
            .cloned()
            .collect();
        Ok(newest_first(products, |p| p.created_at))
    }

    async fn search_products(&self, query: &str) -> StoreResult<Vec<Product>> {
        let needle = query.to_lowercase();
        let products = self
            .inner
            .read()
            .unwrap()
            .products
            .values()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Ok(newest_first(products, |p| p.created_at)
            .into_iter()
            .take(20)
            .collect())
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.inner.read().unwrap().products.get(&id).cloned())
    }

    async fn recommended_products(&self, id: Uuid) -> StoreResult<Vec<Product>> {
        let inner = self.inner.read().unwrap();
        let Some(product) = inner.products.get(&id) else {
            return Ok(vec![]);
        };
        let mut same_category: Vec<Product> = inner
            .products
            .values()
            .filter(|p| p.id != id && p.category == product.category)
            .cloned()
            .collect();
        if same_category.is_empty() {
            same_category = inner
                .products
                .values()
                .filter(|p| p.id != id && p.is_featured)
                .cloned()
                .collect();
        }
        same_category.sort_by(|a, b| b.rating.cmp(&a.rating));
        same_category.truncate(8);
        Ok(same_category)
    }

    async fn create_product(&self, new: NewProduct) -> StoreResult<Product> {
        let product = Product {
            id: Uuid::now_v7(),
            title: new.title,
            description: new.description,
            short_description: new.short_description,
            category: new.category,
            price: round2(new.price),
            image: new.image,
            author: new.author,
            rating: Decimal::ZERO,
            downloads: 0,
            review_count: 0,
            stock_count: new.stock_count,
            is_featured: new.is_featured,
            tags: new.tags,
            license_type: new.license_type,
            version: new.version,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .unwrap()
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> StoreResult<Option<Product>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.products.get_mut(&id).map(|p| {
            if let Some(title) = patch.title {
                p.title = title;
            }
            if let Some(description) = patch.description {
                p.description = description;
            }
            if let Some(short_description) = patch.short_description {
                p.short_description = Some(short_description);
            }
            if let Some(category) = patch.category {
                p.category = category;
            }
            if let Some(price) = patch.price {
                p.price = round2(price);
            }
            if let Some(image) = patch.image {
                p.image = Some(image);
            }
            if let Some(author) = patch.author {
                p.author = Some(author);
            }
            if let Some(stock_count) = patch.stock_count {
                p.stock_count = stock_count;
            }
            if let Some(is_featured) = patch.is_featured {
                p.is_featured = is_featured;
            }
            if let Some(tags) = patch.tags {
                p.tags = tags;
            }
            if let Some(license_type) = patch.license_type {
                p.license_type = license_type;
            }
            if let Some(version) = patch.version {
                p.version = Some(version);
            }
            p.clone()
        }))
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().products.remove(&id);
        Ok(())
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<Category> = self
            .inner
            .read()
            .unwrap()
            .categories
            .values()
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn categories_with_counts(&self) -> StoreResult<Vec<CategoryWithCount>> {
        let inner = self.inner.read().unwrap();
        let mut out: Vec<CategoryWithCount> = inner
            .categories
            .values()
            .map(|category| CategoryWithCount {
                product_count: inner
                    .products
                    .values()
                    .filter(|p| p.category == category.name)
                    .count() as i64,
                category: category.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.category.name.cmp(&b.category.name));
        Ok(out)
    }

    async fn category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn create_category(&self, new: NewCategory) -> StoreResult<Category> {
        let category = Category {
            id: Uuid::now_v7(),
            slug: slugify(&new.name),
            name: new.name,
            description: new.description,
            image: new.image,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .unwrap()
            .categories
            .insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Uuid,
        patch: CategoryPatch,
    ) -> StoreResult<Option<Category>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.categories.get_mut(&id).map(|c| {
            if let Some(name) = patch.name {
                c.slug = slugify(&name);
                c.name = name;
            }
            if let Some(description) = patch.description {
                c.description = Some(description);
            }
            if let Some(image) = patch.image {
                c.image = Some(image);
            }
            c.clone()
        }))
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().categories.remove(&id);
        Ok(())
    }

    // -- cart & wishlist -----------------------------------------------------

    async fn cart_lines(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>> {
        let inner = self.inner.read().unwrap();
        let mut items: Vec<CartItem> = inner
            .cart_items
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items
            .into_iter()
            .filter_map(|item| {
                inner
                    .products
                    .get(&item.product_id)
                    .cloned()
                    .map(|product| CartLine { item, product })
            })
            .collect())
    }

    async fn cart_item(&self, id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(self.inner.read().unwrap().cart_items.get(&id).cloned())
    }

    async fn upsert_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> StoreResult<CartItem> {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner
            .cart_items
            .values_mut()
            .find(|i| i.user_id == user_id && i.product_id == product_id)
        {
            existing.quantity += quantity;
            return Ok(existing.clone());
        }
        let item = CartItem {
            id: Uuid::now_v7(),
            user_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        };
        inner.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_cart_quantity(&self, id: Uuid, quantity: i32) -> StoreResult<Option<CartItem>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.cart_items.get_mut(&id).map(|item| {
            item.quantity = quantity;
            item.clone()
        }))
    }

    async fn remove_cart_item(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().cart_items.remove(&id);
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        self.inner
            .write()
            .unwrap()
            .cart_items
            .retain(|_, item| item.user_id != user_id);
        Ok(())
    }

    async fn carts_with_totals(&self) -> StoreResult<Vec<CartSummary>> {
        let inner = self.inner.read().unwrap();
        let items: Vec<CartItem> = inner.cart_items.values().cloned().collect();

        let mut summaries: Vec<CartSummary> = Vec::new();
        let mut slots: HashMap<Uuid, usize> = HashMap::new();
        for item in newest_first(items, |i| i.created_at) {
            let Some(product) = inner.products.get(&item.product_id).cloned() else {
                continue;
            };
            let Some(user) = inner.users.get(&item.user_id) else {
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
        let inner = self.inner.read().unwrap();
        let items: Vec<WishlistItem> = inner
            .wishlist
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(items, |i| i.created_at)
            .into_iter()
            .filter_map(|item| {
                inner
                    .products
                    .get(&item.product_id)
                    .cloned()
                    .map(|product| WishlistLine { item, product })
            })
            .collect())
    }

    async fn wishlist_item(&self, id: Uuid) -> StoreResult<Option<WishlistItem>> {
        Ok(self.inner.read().unwrap().wishlist.get(&id).cloned())
    }

    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<WishlistItem> {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner
            .wishlist
            .values()
            .find(|i| i.user_id == user_id && i.product_id == product_id)
        {
            return Ok(existing.clone());
        }
        let item = WishlistItem {
            id: Uuid::now_v7(),
            user_id,
            product_id,
            created_at: Utc::now(),
        };
        inner.wishlist.insert(item.id, item.clone());
        Ok(item)
    }

    async fn remove_wishlist_item(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().wishlist.remove(&id);
        Ok(())
    }

    // -- orders & payments ---------------------------------------------------

    async fn create_order_with_items(
        &self,
        new: NewOrder,
        items: &[NewOrderItem],
    ) -> StoreResult<Order> {
        let mut inner = self.inner.write().unwrap();
        let order = Order {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            total_amount: round2(new.total_amount),
            status: OrderStatus::Pending.as_str().to_string(),
            payment_intent_id: Some(new.payment_intent_id),
            created_at: Utc::now(),
        };
        for item in items {
            inner.order_items.push(OrderItem {
                id: Uuid::now_v7(),
                order_id: order.id,
                product_id: item.product_id,
                price: round2(item.price),
                quantity: item.quantity,
                license_key: None,
            });
        }
        inner.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.inner.read().unwrap().orders.get(&id).cloned())
    }

    async fn order_by_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .orders
            .values()
            .find(|o| o.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let orders = self
            .inner
            .read()
            .unwrap()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o| o.created_at))
    }

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .map(|item| {
                let product = inner.products.get(&item.product_id).cloned();
                OrderLine { item, product }
            })
            .collect())
    }

    async fn orders_with_users(&self) -> StoreResult<Vec<OrderWithUser>> {
        let inner = self.inner.read().unwrap();
        let detailed = inner
            .orders
            .values()
            .filter_map(|order| {
                let user = inner.users.get(&order.user_id)?.clone();
                Some(OrderWithUser {
                    order: order.clone(),
                    user,
                })
            })
            .collect();
        Ok(newest_first(detailed, |d| d.order.created_at))
    }

    async fn complete_order(&self, order_id: Uuid) -> StoreResult<TransitionOutcome> {
        let mut inner = self.inner.write().unwrap();
        let status = match inner.orders.get(&order_id) {
            Some(order) => order.status.clone(),
            None => return Err(StoreError::NotFound("Order")),
        };
        match OrderStatus::parse(&status) {
            Some(s) if s.can_become(OrderStatus::Completed) => {}
            Some(OrderStatus::Completed) => return Ok(TransitionOutcome::AlreadyCompleted),
            _ => return Ok(TransitionOutcome::AlreadyFailed),
        }
        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.status = OrderStatus::Completed.as_str().to_string();
        }
        let reductions: Vec<(Uuid, i32)> = inner
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|i| (i.product_id, i.quantity))
            .collect();
        for (product_id, quantity) in reductions {
            if let Some(product) = inner.products.get_mut(&product_id) {
                product.stock_count = (product.stock_count - quantity).max(0);
                product.downloads += quantity;
            }
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn fail_order(&self, order_id: Uuid) -> StoreResult<TransitionOutcome> {
        let mut inner = self.inner.write().unwrap();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound("Order"))?;
        match OrderStatus::parse(&order.status) {
            Some(s) if s.can_become(OrderStatus::Failed) => {
                order.status = OrderStatus::Failed.as_str().to_string();
                Ok(TransitionOutcome::Applied)
            }
            Some(OrderStatus::Completed) => Ok(TransitionOutcome::AlreadyCompleted),
            _ => Ok(TransitionOutcome::AlreadyFailed),
        }
    }

    async fn has_user_purchased(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.order_items.iter().any(|item| {
            item.product_id == product_id
                && inner
                    .orders
                    .get(&item.order_id)
                    .map(|o| o.user_id == user_id && o.status == OrderStatus::Completed.as_str())
                    .unwrap_or(false)
        }))
    }

    async fn record_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let payment = Payment {
            id: Uuid::now_v7(),
            order_id: new.order_id,
            user_id: new.user_id,
            provider: "razorpay".to_string(),
            provider_payment_id: new.provider_payment_id,
            provider_order_id: new.provider_order_id,
            amount: round2(new.amount),
            currency: new.currency,
            status: new.status,
            method: None,
            created_at: Utc::now(),
        };
        self.inner.write().unwrap().payments.push(payment.clone());
        Ok(payment)
    }

    // -- reviews -------------------------------------------------------------

    async fn product_reviews(&self, product_id: Uuid) -> StoreResult<Vec<ProductReview>> {
        let inner = self.inner.read().unwrap();
        let reviews: Vec<Review> = inner
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        Ok(newest_first(reviews, |r| r.created_at)
            .into_iter()
            .filter_map(|review| {
                inner.users.get(&review.user_id).map(|u| ProductReview {
                    user: ReviewAuthor {
                        id: u.id,
                        name: u.name.clone(),
                        avatar: u.avatar.clone(),
                    },
                    review,
                })
            })
            .collect())
    }

    async fn user_product_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<Review>> {
        let reviews: Vec<Review> = self
            .inner
            .read()
            .unwrap()
            .reviews
            .iter()
            .filter(|r| r.user_id == user_id && r.product_id == product_id)
            .cloned()
            .collect();
        Ok(newest_first(reviews, |r| r.created_at).into_iter().next())
    }

    async fn create_review(&self, new: NewReview) -> StoreResult<Review> {
        let mut inner = self.inner.write().unwrap();
        let review = Review {
            id: Uuid::now_v7(),
            product_id: new.product_id,
            user_id: new.user_id,
            rating: new.rating,
            comment: new.comment,
            is_verified_purchase: new.is_verified_purchase,
            created_at: Utc::now(),
        };
        inner.reviews.push(review.clone());
        let ratings: Vec<i32> = inner
            .reviews
            .iter()
            .filter(|r| r.product_id == new.product_id)
            .map(|r| r.rating)
            .collect();
        if let Some(product) = inner.products.get_mut(&new.product_id) {
            let sum: i32 = ratings.iter().sum();
            product.rating = round2(Decimal::from(sum) / Decimal::from(ratings.len() as i32));
            product.review_count = ratings.len() as i32;
        }
        Ok(review)
    }

    // -- marketing -----------------------------------------------------------

    async fn active_deals(&self) -> StoreResult<Vec<Deal>> {
        let now = Utc::now();
        let mut deals: Vec<Deal> = self
            .inner
            .read()
            .unwrap()
            .deals
            .values()
            .filter(|d| d.is_redeemable(now))
            .cloned()
            .collect();
        deals.sort_by_key(|d| d.end_date);
        Ok(deals)
    }

    async fn deal(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        Ok(self.inner.read().unwrap().deals.get(&id).cloned())
    }

    async fn deal_by_code(&self, code: &str) -> StoreResult<Option<Deal>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .deals
            .values()
            .find(|d| d.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn deals(&self) -> StoreResult<Vec<Deal>> {
        let deals = self.inner.read().unwrap().deals.values().cloned().collect();
        Ok(newest_first(deals, |d| d.created_at))
    }

    async fn create_deal(&self, new: NewDeal) -> StoreResult<Deal> {
        let deal = Deal {
            id: Uuid::now_v7(),
            title: new.title,
            description: new.description,
            discount_percent: new.discount_percent,
            code: new.code,
            start_date: new.start_date,
            end_date: new.end_date,
            is_active: new.is_active,
            created_at: Utc::now(),
        };
        self.inner.write().unwrap().deals.insert(deal.id, deal.clone());
        Ok(deal)
    }

    async fn update_deal(&self, id: Uuid, patch: DealPatch) -> StoreResult<Option<Deal>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.deals.get_mut(&id).map(|d| {
            if let Some(title) = patch.title {
                d.title = title;
            }
            if let Some(description) = patch.description {
                d.description = Some(description);
            }
            if let Some(discount_percent) = patch.discount_percent {
                d.discount_percent = discount_percent;
            }
            if let Some(code) = patch.code {
                d.code = code;
            }
            if let Some(start_date) = patch.start_date {
                d.start_date = start_date;
            }
            if let Some(end_date) = patch.end_date {
                d.end_date = end_date;
            }
            if let Some(is_active) = patch.is_active {
                d.is_active = is_active;
            }
            d.clone()
        }))
    }

    async fn delete_deal(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().deals.remove(&id);
        Ok(())
    }

    async fn visible_testimonials(&self) -> StoreResult<Vec<Testimonial>> {
        let testimonials = self
            .inner
            .read()
            .unwrap()
            .testimonials
            .values()
            .filter(|t| t.is_visible)
            .cloned()
            .collect();
        Ok(newest_first(testimonials, |t| t.created_at))
    }

    async fn testimonials(&self) -> StoreResult<Vec<Testimonial>> {
        let testimonials = self.inner.read().unwrap().testimonials.values().cloned().collect();
        Ok(newest_first(testimonials, |t| t.created_at))
    }

    async fn create_testimonial(&self, new: NewTestimonial) -> StoreResult<Testimonial> {
        let testimonial = Testimonial {
            id: Uuid::now_v7(),
            name: new.name,
            role: new.role,
            avatar: new.avatar,
            rating: new.rating,
            content: new.content,
            is_verified: new.is_verified,
            is_visible: new.is_visible,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .unwrap()
            .testimonials
            .insert(testimonial.id, testimonial.clone());
        Ok(testimonial)
    }

    async fn update_testimonial(
        &self,
        id: Uuid,
        patch: TestimonialPatch,
    ) -> StoreResult<Option<Testimonial>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.testimonials.get_mut(&id).map(|t| {
            if let Some(is_visible) = patch.is_visible {
                t.is_visible = is_visible;
            }
            if let Some(is_verified) = patch.is_verified {
                t.is_verified = is_verified;
            }
            if let Some(content) = patch.content {
                t.content = content;
            }
            t.clone()
        }))
    }

    async fn delete_testimonial(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().testimonials.remove(&id);
        Ok(())
    }

    async fn active_announcements(&self) -> StoreResult<Vec<Announcement>> {
        let mut announcements: Vec<Announcement> = self
            .inner
            .read()
            .unwrap()
            .announcements
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        announcements.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(announcements)
    }

    async fn announcements(&self) -> StoreResult<Vec<Announcement>> {
        let announcements = self.inner.read().unwrap().announcements.values().cloned().collect();
        Ok(newest_first(announcements, |a| a.created_at))
    }

    async fn create_announcement(&self, new: NewAnnouncement) -> StoreResult<Announcement> {
        let announcement = Announcement {
            id: Uuid::now_v7(),
            content: new.content,
            link: new.link,
            kind: new.kind,
            is_active: new.is_active,
            priority: new.priority,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .unwrap()
            .announcements
            .insert(announcement.id, announcement.clone());
        Ok(announcement)
    }

    async fn update_announcement(
        &self,
        id: Uuid,
        patch: AnnouncementPatch,
    ) -> StoreResult<Option<Announcement>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.announcements.get_mut(&id).map(|a| {
            if let Some(content) = patch.content {
                a.content = content;
            }
            if let Some(link) = patch.link {
                a.link = Some(link);
            }
            if let Some(kind) = patch.kind {
                a.kind = kind;
            }
            if let Some(is_active) = patch.is_active {
                a.is_active = is_active;
            }
            if let Some(priority) = patch.priority {
                a.priority = priority;
            }
            a.clone()
        }))
    }

    async fn delete_announcement(&self, id: Uuid) -> StoreResult<()> {
        self.inner.write().unwrap().announcements.remove(&id);
        Ok(())
    }

    async fn subscribe_newsletter(&self, email: &str) -> StoreResult<NewsletterSubscriber> {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner
            .newsletter
            .iter_mut()
            .find(|s| s.email.eq_ignore_ascii_case(email))
        {
            existing.is_active = true;
            return Ok(existing.clone());
        }
        let subscriber = NewsletterSubscriber {
            id: Uuid::now_v7(),
            email: email.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        inner.newsletter.push(subscriber.clone());
        Ok(subscriber)
    }

    async fn newsletter_subscribers(&self) -> StoreResult<Vec<NewsletterSubscriber>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .newsletter
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn create_product_request(&self, new: NewProductRequest) -> StoreResult<ProductRequest> {
        let request = ProductRequest {
            id: Uuid::now_v7(),
            product_name: new.product_name,
            email: new.email,
            message: new.message,
            status: "pending".to_string(),
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .unwrap()
            .product_requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn product_requests(&self, status: Option<&str>) -> StoreResult<Vec<ProductRequest>> {
        let requests = self
            .inner
            .read()
            .unwrap()
            .product_requests
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        Ok(newest_first(requests, |r| r.created_at))
    }

    async fn set_product_request_status(
        &self,
        id: Uuid,
        status: &str,
    ) -> StoreResult<Option<ProductRequest>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.product_requests.get_mut(&id).map(|r| {
            r.status = status.to_string();
            r.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, price: i64, stock: i32) -> NewProduct {
        NewProduct {
            title: title.to_string(),
            description: String::new(),
            short_description: None,
            category: "tools".to_string(),
            price: Decimal::new(price, 2),
            image: None,
            author: None,
            stock_count: stock,
            is_featured: false,
            tags: serde_json::Value::Array(vec![]),
            license_type: "standard".to_string(),
            version: None,
        }
    }

    async fn seeded_order(store: &MemoryStore, quantity: i32, stock: i32) -> (Order, Uuid) {
        let user = store
            .create_user(NewUser {
                email: "buyer@example.com".to_string(),
                name: "Buyer".to_string(),
                password_hash: "x".to_string(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();
        let p = store.create_product(product("Widget", 1000, stock)).await.unwrap();
        let order = store
            .create_order_with_items(
                NewOrder {
                    user_id: user.id,
                    total_amount: Decimal::new(1000 * quantity as i64, 2),
                    payment_intent_id: "order_test_1".to_string(),
                },
                &[NewOrderItem {
                    product_id: p.id,
                    price: p.price,
                    quantity,
                }],
            )
            .await
            .unwrap();
        (order, p.id)
    }

    #[tokio::test]
    async fn test_complete_order_is_exactly_once() {
        let store = MemoryStore::new();
        let (order, product_id) = seeded_order(&store, 2, 5).await;

        assert_eq!(
            store.complete_order(order.id).await.unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(
            store.complete_order(order.id).await.unwrap(),
            TransitionOutcome::AlreadyCompleted
        );

        let p = store.product(product_id).await.unwrap().unwrap();
        assert_eq!(p.stock_count, 3);
        assert_eq!(p.downloads, 2);
    }

    #[tokio::test]
    async fn test_stock_clamps_at_zero() {
        let store = MemoryStore::new();
        let (order, product_id) = seeded_order(&store, 3, 1).await;
        store.complete_order(order.id).await.unwrap();
        let p = store.product(product_id).await.unwrap().unwrap();
        assert_eq!(p.stock_count, 0);
        assert_eq!(p.downloads, 3);
    }

    #[tokio::test]
    async fn test_failed_never_overwrites_completed() {
        let store = MemoryStore::new();
        let (order, _) = seeded_order(&store, 1, 5).await;
        store.complete_order(order.id).await.unwrap();
        assert_eq!(
            store.fail_order(order.id).await.unwrap(),
            TransitionOutcome::AlreadyCompleted
        );
        let order = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, "completed");
    }

    #[tokio::test]
    async fn test_completed_never_overwrites_failed() {
        let store = MemoryStore::new();
        let (order, product_id) = seeded_order(&store, 2, 5).await;
        assert_eq!(store.fail_order(order.id).await.unwrap(), TransitionOutcome::Applied);
        assert_eq!(
            store.complete_order(order.id).await.unwrap(),
            TransitionOutcome::AlreadyFailed
        );
        let order = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, "failed");
        let p = store.product(product_id).await.unwrap().unwrap();
        assert_eq!(p.stock_count, 5);
    }

    #[tokio::test]
    async fn test_cart_upsert_accumulates() {
        let store = MemoryStore::new();
        let p = store.create_product(product("Widget", 500, 10)).await.unwrap();
        let user_id = Uuid::now_v7();
        store.upsert_cart_item(user_id, p.id, 1).await.unwrap();
        let item = store.upsert_cart_item(user_id, p.id, 2).await.unwrap();
        assert_eq!(item.quantity, 3);
        assert_eq!(store.cart_lines(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_review_refreshes_product_rating() {
        let store = MemoryStore::new();
        let p = store.create_product(product("Widget", 500, 10)).await.unwrap();
        for rating in [5, 4] {
            store
                .create_review(NewReview {
                    product_id: p.id,
                    user_id: Uuid::now_v7(),
                    rating,
                    comment: None,
                    is_verified_purchase: false,
                })
                .await
                .unwrap();
        }
        let p = store.product(p.id).await.unwrap().unwrap();
        assert_eq!(p.review_count, 2);
        assert_eq!(p.rating, Decimal::new(450, 2));
    }

    #[tokio::test]
    async fn test_has_user_purchased_requires_completed() {
        let store = MemoryStore::new();
        let (order, product_id) = seeded_order(&store, 1, 5).await;
        assert!(!store.has_user_purchased(order.user_id, product_id).await.unwrap());
        store.complete_order(order.id).await.unwrap();
        assert!(store.has_user_purchased(order.user_id, product_id).await.unwrap());
    }
}

//! Storage abstraction.
//!
//! Handlers depend on `Arc<dyn Store>`; `PgStore` backs production and
//! `MemoryStore` backs tests and credential-less development runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::TransitionOutcome;
use crate::models::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- accounts ------------------------------------------------------------
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>>;
    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;
    async fn users(&self) -> StoreResult<Vec<User>>;
    async fn record_login_event(&self, event: NewLoginEvent) -> StoreResult<()>;
    async fn login_events_detailed(&self) -> StoreResult<Vec<LoginEventWithUser>>;
    async fn login_events_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<LoginEvent>>;
    async fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn password_reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>>;
    async fn mark_reset_token_used(&self, id: Uuid) -> StoreResult<()>;

    // -- catalog -------------------------------------------------------------
    async fn products(&self) -> StoreResult<Vec<Product>>;
    async fn products_by_category(&self, category: &str) -> StoreResult<Vec<Product>>;
    async fn featured_products(&self) -> StoreResult<Vec<Product>>;
    async fn search_products(&self, query: &str) -> StoreResult<Vec<Product>>;
    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Same-category products excluding the product itself, featured as
    /// fallback, capped at 8.
    async fn recommended_products(&self, id: Uuid) -> StoreResult<Vec<Product>>;
    async fn create_product(&self, new: NewProduct) -> StoreResult<Product>;
    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> StoreResult<Option<Product>>;
    async fn delete_product(&self, id: Uuid) -> StoreResult<()>;

    async fn categories(&self) -> StoreResult<Vec<Category>>;
    async fn categories_with_counts(&self) -> StoreResult<Vec<CategoryWithCount>>;
    async fn category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;
    async fn create_category(&self, new: NewCategory) -> StoreResult<Category>;
    async fn update_category(
        &self,
        id: Uuid,
        patch: CategoryPatch,
    ) -> StoreResult<Option<Category>>;
    async fn delete_category(&self, id: Uuid) -> StoreResult<()>;

    // -- cart & wishlist -----------------------------------------------------
    async fn cart_lines(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>>;
    async fn cart_item(&self, id: Uuid) -> StoreResult<Option<CartItem>>;
    /// Upsert on (user, product), accumulating quantity.
    async fn upsert_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> StoreResult<CartItem>;
    async fn set_cart_quantity(&self, id: Uuid, quantity: i32) -> StoreResult<Option<CartItem>>;
    async fn remove_cart_item(&self, id: Uuid) -> StoreResult<()>;
    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()>;
    /// Every non-empty cart grouped by owner, newest items first.
    async fn carts_with_totals(&self) -> StoreResult<Vec<CartSummary>>;

    async fn wishlist_lines(&self, user_id: Uuid) -> StoreResult<Vec<WishlistLine>>;
    async fn wishlist_item(&self, id: Uuid) -> StoreResult<Option<WishlistItem>>;
    /// Idempotent: adding a product twice returns the existing row.
    async fn add_wishlist_item(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<WishlistItem>;
    async fn remove_wishlist_item(&self, id: Uuid) -> StoreResult<()>;

    // -- orders & payments ---------------------------------------------------
    /// Order and its items are one atomic unit; nothing persists on failure.
    async fn create_order_with_items(
        &self,
        new: NewOrder,
        items: &[NewOrderItem],
    ) -> StoreResult<Order>;
    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn order_by_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>>;
    async fn orders_with_users(&self) -> StoreResult<Vec<OrderWithUser>>;
    /// Compare-and-swap `pending -> completed`. When the swap wins, stock is
    /// decremented (clamped at zero) and the fulfillment counter incremented
    /// for every order item within the same transaction, so completion side
    /// effects happen exactly once per order.
    async fn complete_order(&self, order_id: Uuid) -> StoreResult<TransitionOutcome>;
    /// Compare-and-swap `pending -> failed`. Terminal states are never
    /// overwritten.
    async fn fail_order(&self, order_id: Uuid) -> StoreResult<TransitionOutcome>;
    async fn has_user_purchased(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<bool>;
    async fn record_payment(&self, new: NewPayment) -> StoreResult<Payment>;

    // -- reviews -------------------------------------------------------------
    async fn product_reviews(&self, product_id: Uuid) -> StoreResult<Vec<ProductReview>>;
    /// The caller's most recent review of a product, if any.
    async fn user_product_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<Review>>;
    /// Inserts the review and refreshes the product's rating mean and review
    /// count in the same transaction.
    async fn create_review(&self, new: NewReview) -> StoreResult<Review>;

    // -- marketing -----------------------------------------------------------
    async fn active_deals(&self) -> StoreResult<Vec<Deal>>;
    async fn deal(&self, id: Uuid) -> StoreResult<Option<Deal>>;
    async fn deal_by_code(&self, code: &str) -> StoreResult<Option<Deal>>;
    async fn deals(&self) -> StoreResult<Vec<Deal>>;
    async fn create_deal(&self, new: NewDeal) -> StoreResult<Deal>;
    async fn update_deal(&self, id: Uuid, patch: DealPatch) -> StoreResult<Option<Deal>>;
    async fn delete_deal(&self, id: Uuid) -> StoreResult<()>;

    async fn visible_testimonials(&self) -> StoreResult<Vec<Testimonial>>;
    async fn testimonials(&self) -> StoreResult<Vec<Testimonial>>;
    async fn create_testimonial(&self, new: NewTestimonial) -> StoreResult<Testimonial>;
    async fn update_testimonial(
        &self,
        id: Uuid,
        patch: TestimonialPatch,
    ) -> StoreResult<Option<Testimonial>>;
    async fn delete_testimonial(&self, id: Uuid) -> StoreResult<()>;

    async fn active_announcements(&self) -> StoreResult<Vec<Announcement>>;
    async fn announcements(&self) -> StoreResult<Vec<Announcement>>;
    async fn create_announcement(&self, new: NewAnnouncement) -> StoreResult<Announcement>;
    async fn update_announcement(
        &self,
        id: Uuid,
        patch: AnnouncementPatch,
    ) -> StoreResult<Option<Announcement>>;
    async fn delete_announcement(&self, id: Uuid) -> StoreResult<()>;

    /// Upsert by email; re-subscribing reactivates a lapsed subscriber.
    async fn subscribe_newsletter(&self, email: &str) -> StoreResult<NewsletterSubscriber>;
    async fn newsletter_subscribers(&self) -> StoreResult<Vec<NewsletterSubscriber>>;

    async fn create_product_request(&self, new: NewProductRequest) -> StoreResult<ProductRequest>;
    async fn product_requests(&self, status: Option<&str>) -> StoreResult<Vec<ProductRequest>>;
    async fn set_product_request_status(
        &self,
        id: Uuid,
        status: &str,
    ) -> StoreResult<Option<ProductRequest>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Developer Tools"), "developer-tools");
        assert_eq!(slugify("  UI Kits "), "ui-kits");
    }
}

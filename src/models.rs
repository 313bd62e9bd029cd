//! Persistent rows and their wire shapes.
//!
//! Columns are snake_case, JSON fields camelCase. Money columns are
//! NUMERIC(10,2) carried as `Decimal` and serialized as 2-decimal strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoginEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoginEvent {
    pub user_id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginEventWithUser {
    #[serde(flatten)]
    pub event: LoginEvent,
    pub user: User,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub short_description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub author: Option<String>,
    pub rating: Decimal,
    pub downloads: i32,
    pub review_count: i32,
    pub stock_count: i32,
    pub is_featured: bool,
    pub tags: serde_json::Value,
    pub license_type: String,
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub short_description: Option<String>,
    #[validate(length(min = 1))]
    pub category: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub stock_count: i32,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "empty_tags")]
    pub tags: serde_json::Value,
    #[serde(default = "standard_license")]
    pub license_type: String,
    pub version: Option<String>,
}

fn empty_tags() -> serde_json::Value {
    serde_json::Value::Array(vec![])
}

fn standard_license() -> String {
    "standard".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub stock_count: Option<i32>,
    pub is_featured: Option<bool>,
    pub tags: Option<serde_json::Value>,
    pub license_type: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

// =============================================================================
// Cart & wishlist
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Cart item joined with its product, the shape the cart endpoints return.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistLine {
    #[serde(flatten)]
    pub item: WishlistItem,
    pub product: Product,
}

/// One user's open cart, as listed on the admin dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub user: User,
    pub items: Vec<CartLine>,
    pub total_value: Decimal,
}

// =============================================================================
// Orders & payments
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub status: String,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub price: Decimal,
    pub quantity: i32,
    pub license_key: Option<String>,
}

/// Line captured at checkout; price is the snapshot, not a catalog read.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithUser {
    #[serde(flatten)]
    pub order: Order,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub provider_order_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub provider_payment_id: Option<String>,
    pub provider_order_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
}

// =============================================================================
// Reviews
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub is_verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

/// Review joined with its author, the shape the review list returns.
#[derive(Debug, Clone, Serialize)]
pub struct ProductReview {
    #[serde(flatten)]
    pub review: Review,
    pub user: ReviewAuthor,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub is_verified_purchase: bool,
}

// =============================================================================
// Marketing
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub discount_percent: i32,
    pub code: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Deal {
    /// Active flag plus date window; both gate redemption.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub discount_percent: i32,
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub discount_percent: Option<i32>,
    pub code: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub id: Uuid,
    pub name: String,
    pub role: Option<String>,
    pub avatar: Option<String>,
    pub rating: i32,
    pub content: String,
    pub is_verified: bool,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewTestimonial {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub role: Option<String>,
    pub avatar: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(min = 1))]
    pub content: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default = "default_true")]
    pub is_visible: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialPatch {
    pub is_visible: Option<bool>,
    pub is_verified: Option<bool>,
    pub content: Option<String>,
}

/// Site feedback from a visitor or a signed-in user; stored as a testimonial.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewFeedback {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(min = 10, max = 600))]
    pub content: String,
    #[validate(length(min = 1, max = 80))]
    pub name: Option<String>,
    #[validate(length(max = 80))]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub content: String,
    pub link: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub is_active: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncement {
    #[validate(length(min = 1, max = 500))]
    pub content: String,
    pub link: Option<String>,
    #[serde(rename = "type", default = "info_kind")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
}

fn info_kind() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementPatch {
    pub content: Option<String>,
    pub link: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterSubscriber {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub id: Uuid,
    pub product_name: String,
    pub email: String,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub product_name: String,
    #[validate(email)]
    pub email: String,
    pub message: Option<String>,
}

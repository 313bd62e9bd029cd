//! Admin back office. Every handler requires the admin role via
//! [`AdminUser`]; the extractor rejects other accounts before the body runs.

use std::collections::{BTreeMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AdminUser;
use crate::error::{ApiError, Result};
use crate::models::{
    Announcement, AnnouncementPatch, CartSummary, Category, CategoryPatch, Deal, DealPatch,
    LoginEventWithUser, NewAnnouncement, NewCategory, NewDeal, NewProduct, NewTestimonial,
    NewsletterSubscriber, OrderWithItems, OrderWithUser, Product, ProductPatch, ProductRequest,
    Testimonial, TestimonialPatch, User,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/products", post(create_product))
        .route(
            "/api/admin/products/:id",
            patch(update_product).delete(delete_product),
        )
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/carts", get(list_carts))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/orders", get(user_orders))
        .route("/api/admin/logins", get(list_logins))
        .route("/api/admin/analytics/logins", get(login_analytics))
        .route(
            "/api/admin/categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/api/admin/categories/:id",
            patch(update_category).delete(delete_category),
        )
        .route("/api/admin/deals", get(list_deals).post(create_deal))
        .route(
            "/api/admin/deals/:id",
            patch(update_deal).delete(delete_deal),
        )
        .route(
            "/api/admin/testimonials",
            get(list_testimonials).post(create_testimonial),
        )
        .route(
            "/api/admin/testimonials/:id",
            patch(update_testimonial).delete(delete_testimonial),
        )
        .route(
            "/api/admin/announcements",
            get(list_announcements).post(create_announcement),
        )
        .route(
            "/api/admin/announcements/:id",
            patch(update_announcement).delete(delete_announcement),
        )
        .route("/api/admin/newsletter-subscribers", get(list_subscribers))
        .route("/api/admin/product-requests", get(list_product_requests))
        .route("/api/admin/product-requests/:id", patch(update_product_request))
}

fn validation_error(_: validator::ValidationErrors) -> ApiError {
    ApiError::BadRequest("Validation error".to_string())
}

// -----------------------------------------------------------------------------
// Products
// -----------------------------------------------------------------------------

async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NewProduct>,
) -> Result<Json<Product>> {
    req.validate().map_err(validation_error)?;
    Ok(Json(state.store.create_product(req).await?))
}

async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    let product = state
        .store
        .update_product(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.store.delete_product(id).await?;
    Ok(Json(json!({ "success": true })))
}

// -----------------------------------------------------------------------------
// Orders, carts, users
// -----------------------------------------------------------------------------

async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<OrderWithUser>>> {
    Ok(Json(state.store.orders_with_users().await?))
}

async fn list_carts(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<CartSummary>>> {
    Ok(Json(state.store.carts_with_totals().await?))
}

async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<User>>> {
    Ok(Json(state.store.users().await?))
}

async fn user_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderWithItems>>> {
    let orders = state.store.orders_for_user(id).await?;
    let mut out = Vec::with_capacity(orders.len());
    for order in orders {
        let items = state.store.order_lines(order.id).await?;
        out.push(OrderWithItems { order, items });
    }
    Ok(Json(out))
}

async fn list_logins(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<LoginEventWithUser>>> {
    Ok(Json(state.store.login_events_detailed().await?))
}

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    days: Option<i64>,
}

async fn login_analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<serde_json::Value>> {
    let days = query.days.unwrap_or(30);
    let events = state
        .store
        .login_events_since(Utc::now() - Duration::days(days))
        .await?;

    let unique_users: HashSet<Uuid> = events.iter().map(|e| e.user_id).collect();
    let mut by_date: BTreeMap<String, i64> = BTreeMap::new();
    for event in &events {
        *by_date
            .entry(event.created_at.format("%Y-%m-%d").to_string())
            .or_insert(0) += 1;
    }

    Ok(Json(json!({
        "totalLogins": events.len(),
        "uniqueUsers": unique_users.len(),
        "byDate": by_date,
    })))
}

// -----------------------------------------------------------------------------
// Categories
// -----------------------------------------------------------------------------

async fn list_categories(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.store.categories().await?))
}

async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NewCategory>,
) -> Result<Json<Category>> {
    req.validate().map_err(validation_error)?;
    Ok(Json(state.store.create_category(req).await?))
}

async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<CategoryPatch>,
) -> Result<Json<Category>> {
    let category = state
        .store
        .update_category(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.store.delete_category(id).await?;
    Ok(Json(json!({ "success": true })))
}

// -----------------------------------------------------------------------------
// Deals
// -----------------------------------------------------------------------------

async fn list_deals(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Deal>>> {
    Ok(Json(state.store.deals().await?))
}

async fn create_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NewDeal>,
) -> Result<Json<Deal>> {
    req.validate().map_err(validation_error)?;
    if state.store.deal_by_code(&req.code).await?.is_some() {
        return Err(ApiError::BadRequest(
            "A deal with this code already exists".to_string(),
        ));
    }
    Ok(Json(state.store.create_deal(req).await?))
}

async fn update_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<DealPatch>,
) -> Result<Json<Deal>> {
    let existing = state
        .store
        .deal(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Deal not found".to_string()))?;

    // Only a code handed to some other deal is a conflict.
    if let Some(code) = patch.code.as_deref() {
        if code != existing.code {
            let taken = state
                .store
                .deal_by_code(code)
                .await?
                .map_or(false, |other| other.id != id);
            if taken {
                return Err(ApiError::BadRequest(
                    "A deal with this code already exists".to_string(),
                ));
            }
        }
    }

    let deal = state
        .store
        .update_deal(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Deal not found".to_string()))?;
    Ok(Json(deal))
}

async fn delete_deal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.store.delete_deal(id).await?;
    Ok(Json(json!({ "success": true })))
}

// -----------------------------------------------------------------------------
// Testimonials
// -----------------------------------------------------------------------------

async fn list_testimonials(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Testimonial>>> {
    Ok(Json(state.store.testimonials().await?))
}

async fn create_testimonial(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NewTestimonial>,
) -> Result<Json<Testimonial>> {
    req.validate().map_err(validation_error)?;
    Ok(Json(state.store.create_testimonial(req).await?))
}

async fn update_testimonial(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<TestimonialPatch>,
) -> Result<Json<Testimonial>> {
    let testimonial = state
        .store
        .update_testimonial(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Testimonial not found".to_string()))?;
    Ok(Json(testimonial))
}

async fn delete_testimonial(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.store.delete_testimonial(id).await?;
    Ok(Json(json!({ "success": true })))
}

// -----------------------------------------------------------------------------
// Announcements
// -----------------------------------------------------------------------------

async fn list_announcements(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Announcement>>> {
    Ok(Json(state.store.announcements().await?))
}

async fn create_announcement(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NewAnnouncement>,
) -> Result<Json<Announcement>> {
    req.validate().map_err(validation_error)?;
    Ok(Json(state.store.create_announcement(req).await?))
}

async fn update_announcement(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<AnnouncementPatch>,
) -> Result<Json<Announcement>> {
    let announcement = state
        .store
        .update_announcement(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Announcement not found".to_string()))?;
    Ok(Json(announcement))
}

async fn delete_announcement(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.store.delete_announcement(id).await?;
    Ok(Json(json!({ "success": true })))
}

// -----------------------------------------------------------------------------
// Newsletter & product requests
// -----------------------------------------------------------------------------

async fn list_subscribers(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<NewsletterSubscriber>>> {
    Ok(Json(state.store.newsletter_subscribers().await?))
}

#[derive(Debug, Deserialize)]
struct RequestsQuery {
    status: Option<String>,
}

async fn list_product_requests(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<Vec<ProductRequest>>> {
    Ok(Json(
        state.store.product_requests(query.status.as_deref()).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct StatusPatch {
    status: Option<String>,
}

async fn update_product_request(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<StatusPatch>,
) -> Result<Json<ProductRequest>> {
    let status = patch
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Status is required".to_string()))?;
    let request = state
        .store
        .set_product_request_status(id, status)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product request not found".to_string()))?;
    Ok(Json(request))
}

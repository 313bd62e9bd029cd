//! Public marketing surface: deals, coupon validation, testimonials,
//! announcements, the newsletter and product requests.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{Announcement, Deal, NewFeedback, NewProductRequest, NewTestimonial, Testimonial};
use crate::state::AppState;

/// Coupon handed to every new newsletter subscriber.
const WELCOME_COUPON: &str = "WELCOME10";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/deals", get(list_deals))
        .route("/api/coupon/validate", post(validate_coupon))
        .route("/api/testimonials", get(list_testimonials))
        .route("/api/testimonials/feedback", post(submit_feedback))
        .route("/api/announcements", get(list_announcements))
        .route("/api/newsletter/subscribe", post(subscribe))
        .route("/api/product-requests", post(request_product))
}

async fn list_deals(State(state): State<AppState>) -> Result<Json<Vec<Deal>>> {
    Ok(Json(state.store.active_deals().await?))
}

#[derive(Debug, Deserialize)]
struct CouponRequest {
    code: Option<String>,
}

async fn validate_coupon(
    State(state): State<AppState>,
    Json(req): Json<CouponRequest>,
) -> Result<Response> {
    let code = req
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Coupon code is required".to_string()))?;

    // Lookup is case-insensitive; redeemability folds the inactive and
    // out-of-window cases into the same not-found answer.
    let deal = state
        .store
        .deal_by_code(code)
        .await?
        .filter(|deal| deal.is_redeemable(Utc::now()));
    let Some(deal) = deal else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Invalid or expired coupon code", "valid": false })),
        )
            .into_response());
    };
    Ok(Json(json!({
        "valid": true,
        "deal": {
            "id": deal.id,
            "code": deal.code,
            "title": deal.title,
            "discountPercent": deal.discount_percent,
            "description": deal.description,
        }
    }))
    .into_response())
}

async fn list_testimonials(State(state): State<AppState>) -> Result<Json<Vec<Testimonial>>> {
    Ok(Json(state.store.visible_testimonials().await?))
}

async fn submit_feedback(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(req): Json<NewFeedback>,
) -> Result<(StatusCode, Json<Testimonial>)> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid feedback data".to_string()))?;

    let account = match &user {
        Some(auth) => state.store.user(auth.id).await?,
        None => None,
    };
    let name = trimmed(req.name)
        .or_else(|| account.as_ref().map(|u| u.name.clone()))
        .unwrap_or_else(|| "Anonymous Customer".to_string());
    let role = trimmed(req.role).unwrap_or_else(|| {
        match account.as_ref().map(|u| u.role.as_str()) {
            Some("admin") => "Administrator".to_string(),
            _ => "Customer".to_string(),
        }
    });

    let testimonial = state
        .store
        .create_testimonial(NewTestimonial {
            name,
            role: Some(role),
            avatar: account.and_then(|u| u.avatar),
            rating: req.rating,
            content: req.content,
            is_verified: false,
            is_visible: true,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(testimonial)))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn list_announcements(State(state): State<AppState>) -> Result<Json<Vec<Announcement>>> {
    Ok(Json(state.store.active_announcements().await?))
}

#[derive(Debug, Deserialize, Validate)]
struct SubscribeRequest {
    #[validate(email)]
    email: String,
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<serde_json::Value>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid email address".to_string()))?;
    // Resubscribing is not an error; the upsert reactivates the row.
    state.store.subscribe_newsletter(&req.email).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Successfully subscribed to newsletter!",
        "couponCode": WELCOME_COUPON,
    })))
}

async fn request_product(
    State(state): State<AppState>,
    Json(req): Json<NewProductRequest>,
) -> Result<Json<serde_json::Value>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid request data".to_string()))?;
    state.store.create_product_request(req).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Thank you for your request! We'll review it and get back to you soon."
    })))
}

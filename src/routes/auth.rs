//! Signup, login, sessions and password reset.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, AuthUser};
use crate::error::{ApiError, Result};
use crate::models::{NewLoginEvent, NewUser, User, UserPatch};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", patch(update_profile))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password))
}

/// Profile subset returned by the auth endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserProfile {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    address: Option<String>,
    role: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            address: user.address,
            role: user.role,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    if state.store.user_by_email(&req.email).await?.is_some() {
        return Err(ApiError::BadRequest("Email already registered".to_string()));
    }
    let user = state
        .store
        .create_user(NewUser {
            email: req.email.to_lowercase(),
            name: req.name,
            password_hash: auth::hash_password(&req.password)?,
            phone: req.phone,
            address: req.address,
        })
        .await?;
    tracing::info!(user_id = %user.id, "New account created");
    let token = auth::issue_token(&user, &state.config.jwt_secret)?;
    let cookie = [(SET_COOKIE, auth::auth_cookie(&token, state.config.dev_mode))];
    Ok((cookie, Json(json!({ "user": UserProfile::from(user) }))))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let user = state
        .store
        .user_by_email(&req.email)
        .await?
        .filter(|u| auth::verify_password(&req.password, &u.password_hash))
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let device = user_agent
        .as_deref()
        .map(|ua| if ua.contains("Mobile") { "mobile" } else { "desktop" }.to_string());
    state
        .store
        .record_login_event(NewLoginEvent {
            user_id: user.id,
            ip: forwarded_ip(&headers),
            user_agent,
            device,
        })
        .await?;

    let token = auth::issue_token(&user, &state.config.jwt_secret)?;
    let cookie = [(SET_COOKIE, auth::auth_cookie(&token, state.config.dev_mode))];
    Ok((cookie, Json(json!({ "user": UserProfile::from(user) }))))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    forwarded.split(',').next().map(|ip| ip.trim().to_string())
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = [(SET_COOKIE, auth::clear_cookie(state.config.dev_mode))];
    (cookie, Json(json!({ "message": "Logged out successfully" })))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<serde_json::Value>> {
    let user = state
        .store
        .user(user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(json!({ "user": UserProfile::from(user) })))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(patch): Json<UserPatch>,
) -> Result<Json<serde_json::Value>> {
    let user = state
        .store
        .update_user(user.id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(json!({ "user": UserProfile::from(user) })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    req.validate()?;
    // Same response whether or not the account exists.
    if let Some(user) = state.store.user_by_email(&req.email).await? {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        state
            .store
            .create_password_reset_token(user.id, &token, Utc::now() + Duration::hours(1))
            .await?;
        // Delivery belongs to the mailer; the link is logged for dev setups.
        tracing::info!(user_id = %user.id, "Password reset link: /auth?mode=reset&token={token}");
    }
    Ok(Json(json!({
        "message": "If the email exists, a password reset link has been sent."
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    req.validate()?;
    let reset = state
        .store
        .password_reset_token(&req.token)
        .await?
        .filter(|t| !t.used && t.expires_at > Utc::now())
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired token".to_string()))?;
    state
        .store
        .update_user_password(reset.user_id, &auth::hash_password(&req.password)?)
        .await?;
    state.store.mark_reset_token_used(reset.id).await?;
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

//! JWT session tokens and password hashing.
//!
//! The token travels in an HttpOnly `token` cookie set at signup/login;
//! `Authorization: Bearer` is accepted as a fallback for API clients.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::User;
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";

const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub exp: i64,
}

pub fn issue_token(user: &User, secret: &str) -> Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role.clone(),
        exp: (Utc::now() + Duration::seconds(TOKEN_TTL_SECS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .ok()
}

/// Session cookie carrying the JWT. `Secure` is dropped in development so
/// plain-http localhost setups keep working.
pub fn auth_cookie(token: &str, dev_mode: bool) -> String {
    let mut cookie =
        format!("{TOKEN_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={TOKEN_TTL_SECS}");
    if !dev_mode {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(dev_mode: bool) -> String {
    let mut cookie = format!("{TOKEN_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0");
    if !dev_mode {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| ApiError::Internal(e.into()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE).then(|| value.to_string())
    })
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let auth = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ").map(|t| t.to_string())
}

/// Authenticated caller, extracted from the session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = cookie_token(parts)
            .or_else(|| bearer_token(parts))
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let claims = decode_token(&token, &state.config.jwt_secret)
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Caller with the `admin` role. Rejects everyone else with 403.
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            password_hash: String::new(),
            phone: None,
            address: None,
            role: "user".to_string(),
            avatar: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let u = user();
        let token = issue_token(&u, "test-secret").unwrap();
        let claims = decode_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.email, u.email);
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let token = issue_token(&user(), "test-secret").unwrap();
        assert!(decode_token(&token, "other-secret").is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let u = user();
        let claims = Claims {
            sub: u.id,
            email: u.email,
            role: u.role,
            exp: (Utc::now() - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(decode_token(&token, "test-secret").is_none());
    }

    #[test]
    fn test_cookie_flags() {
        let dev = auth_cookie("abc", true);
        assert!(dev.starts_with("token=abc"));
        assert!(dev.contains("HttpOnly"));
        assert!(!dev.contains("Secure"));
        let prod = auth_cookie("abc", false);
        assert!(prod.contains("Secure"));
        assert!(clear_cookie(true).contains("Max-Age=0"));
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }
}

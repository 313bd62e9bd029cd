//! API error taxonomy. Every failure surfaces as `{ "message": ... }`.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::storage::StoreError;

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Include internal error detail in response bodies. Development only.
pub fn expose_error_details(on: bool) {
    EXPOSE_DETAILS.store(on, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Payment gateway not configured")]
    PaymentsUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::BadRequest(errors.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Self::PaymentsUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Self::Store(StoreError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            Self::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    with_detail("Internal server error", e),
                )
            }
            Self::Gateway(e) => {
                tracing::error!(error = %e, "payment gateway failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    with_detail("Failed to create order", e),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    with_detail("Internal server error", e),
                )
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

fn with_detail(public: &str, err: &dyn std::fmt::Display) -> String {
    if EXPOSE_DETAILS.load(Ordering::Relaxed) {
        format!("{public}: {err}")
    } else {
        public.to_string()
    }
}

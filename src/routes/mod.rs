//! HTTP surface. Route tables live here, handlers in the submodules.

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod marketing;
pub mod orders;
pub mod payments;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "devmart"})) }),
        )
        .merge(auth::routes())
        .merge(catalog::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .merge(payments::routes())
        .merge(marketing::routes())
        .merge(admin::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

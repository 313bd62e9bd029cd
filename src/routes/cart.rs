//! Cart and wishlist. All routes require a signed-in user.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{CartItem, CartLine, WishlistItem, WishlistLine};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cart", get(get_cart).post(add_to_cart))
        .route("/api/cart/merge", post(merge_cart))
        .route("/api/cart/:id", patch(update_cart_item).delete(remove_cart_item))
        .route("/api/wishlist", get(get_wishlist).post(add_to_wishlist))
        .route("/api/wishlist/:id", delete(remove_from_wishlist))
}

async fn get_cart(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<CartLine>>> {
    Ok(Json(state.store.cart_lines(user.id).await?))
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartItem>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid request data".to_string()))?;
    let product = state
        .store
        .product(req.product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
    if product.stock_count <= 0 {
        return Err(ApiError::BadRequest(
            "Product is currently out of stock".to_string(),
        ));
    }
    let existing_quantity = state
        .store
        .cart_lines(user.id)
        .await?
        .iter()
        .find(|line| line.item.product_id == req.product_id)
        .map_or(0, |line| line.item.quantity);
    if existing_quantity + req.quantity > product.stock_count {
        return Err(ApiError::BadRequest(
            "Requested quantity exceeds available stock".to_string(),
        ));
    }
    let item = state
        .store
        .upsert_cart_item(user.id, req.product_id, req.quantity)
        .await?;
    Ok(Json(item))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCartRequest>,
) -> Result<Json<CartItem>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid request data".to_string()))?;
    let existing = owned_cart_item(&state, &user, id).await?;
    if let Some(product) = state.store.product(existing.product_id).await? {
        if req.quantity > product.stock_count {
            return Err(ApiError::BadRequest(
                "Requested quantity exceeds available stock".to_string(),
            ));
        }
    }
    let item = state
        .store
        .set_cart_quantity(id, req.quantity)
        .await?
        .ok_or_else(|| ApiError::NotFound("Cart item not found".to_string()))?;
    Ok(Json(item))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    owned_cart_item(&state, &user, id).await?;
    state.store.remove_cart_item(id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn owned_cart_item(state: &AppState, user: &AuthUser, id: Uuid) -> Result<CartItem> {
    state
        .store
        .cart_item(id)
        .await?
        .filter(|item| item.user_id == user.id)
        .ok_or_else(|| ApiError::NotFound("Cart item not found".to_string()))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MergeItem {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MergeCartRequest {
    #[validate]
    pub items: Vec<MergeItem>,
}

/// Folds a guest cart into the user's cart after login. Unknown and
/// out-of-stock products are skipped; added quantities are capped at the
/// stock still available.
async fn merge_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<MergeCartRequest>,
) -> Result<Json<Vec<CartLine>>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid request data".to_string()))?;

    let mut in_cart: HashMap<Uuid, i32> = state
        .store
        .cart_lines(user.id)
        .await?
        .into_iter()
        .map(|line| (line.item.product_id, line.item.quantity))
        .collect();

    for item in req.items {
        let Some(product) = state.store.product(item.product_id).await? else {
            continue;
        };
        if product.stock_count <= 0 {
            continue;
        }
        let held = in_cart.get(&item.product_id).copied().unwrap_or(0);
        let available = (product.stock_count - held).max(0);
        if available <= 0 {
            continue;
        }
        let to_add = item.quantity.min(available);
        state
            .store
            .upsert_cart_item(user.id, item.product_id, to_add)
            .await?;
        *in_cart.entry(item.product_id).or_insert(0) += to_add;
    }

    Ok(Json(state.store.cart_lines(user.id).await?))
}

async fn get_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<WishlistLine>>> {
    Ok(Json(state.store.wishlist_lines(user.id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
}

async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddToWishlistRequest>,
) -> Result<Json<WishlistItem>> {
    if state.store.product(req.product_id).await?.is_none() {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }
    let item = state
        .store
        .add_wishlist_item(user.id, req.product_id)
        .await?;
    Ok(Json(item))
}

async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state
        .store
        .wishlist_item(id)
        .await?
        .filter(|item| item.user_id == user.id)
        .ok_or_else(|| ApiError::NotFound("Wishlist item not found".to_string()))?;
    state.store.remove_wishlist_item(id).await?;
    Ok(Json(json!({ "success": true })))
}

//! Public catalog: products, categories and reviews.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::models::{CategoryWithCount, NewReview, Product, ProductReview, Review};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/featured", get(featured_products))
        .route("/api/products/search/:query", get(search_products))
        .route("/api/products/:id", get(product_detail))
        .route("/api/products/:id/recommendations", get(recommendations))
        .route("/api/products/:id/reviews", get(product_reviews).post(create_review))
        .route("/api/categories", get(list_categories))
        .route("/api/categories/:slug", get(category_detail))
}

#[derive(Debug, Deserialize)]
struct ProductsQuery {
    category: Option<String>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<Vec<Product>>> {
    let products = match query.category {
        Some(category) => state.store.products_by_category(&category).await?,
        None => state.store.products().await?,
    };
    Ok(Json(products))
}

async fn featured_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store.featured_products().await?))
}

async fn search_products(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store.search_products(&query).await?))
}

async fn product_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>> {
    let product = state
        .store
        .product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
    Ok(Json(product))
}

async fn recommendations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store.recommended_products(id).await?))
}

async fn product_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ProductReview>>> {
    Ok(Json(state.store.product_reviews(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    pub comment: Option<String>,
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Review>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Invalid request data".to_string()))?;
    if state.store.product(id).await?.is_none() {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }
    let is_verified_purchase = state.store.has_user_purchased(user.id, id).await?;
    let review = state
        .store
        .create_review(NewReview {
            product_id: id,
            user_id: user.id,
            rating: req.rating,
            comment: req.comment,
            is_verified_purchase,
        })
        .await?;
    Ok(Json(review))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryWithCount>>> {
    Ok(Json(state.store.categories_with_counts().await?))
}

async fn category_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let category = state
        .store
        .category_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;
    let products = state.store.products_by_category(&category.name).await?;
    Ok(Json(json!({ "category": category, "products": products })))
}

//! Order creation and reads.
//!
//! Creation runs the stock pre-check, asks the gateway for a payment
//! intent, then persists the order atomically with its items in `pending`.
//! Nothing is decremented or cleared until the payment is verified.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::{order_total, to_minor_units};
use crate::error::{ApiError, Result};
use crate::models::{NewOrder, NewOrderItem, Order, OrderLine, Review};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list_orders))
        .route("/api/orders/create", post(create_order))
        .route("/api/orders/:id", get(order_detail))
}

async fn list_orders(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.store.orders_for_user(user.id).await?))
}

async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let gateway = state.gateway()?;

    let lines = state.store.cart_lines(user.id).await?;
    if lines.is_empty() {
        return Err(ApiError::BadRequest("Cart is empty".to_string()));
    }
    for line in &lines {
        if line.product.stock_count < line.item.quantity {
            return Err(ApiError::BadRequest(format!(
                "{} is currently out of stock",
                line.product.title
            )));
        }
    }

    let total = order_total(lines.iter().map(|l| (l.product.price, l.item.quantity)));
    let receipt = format!("order_{}", Utc::now().timestamp_millis());
    let intent = gateway
        .create_intent(to_minor_units(total), &receipt, user.id)
        .await?;

    let items: Vec<NewOrderItem> = lines
        .iter()
        .map(|l| NewOrderItem {
            product_id: l.item.product_id,
            price: l.product.price,
            quantity: l.item.quantity,
        })
        .collect();
    let order = state
        .store
        .create_order_with_items(
            NewOrder {
                user_id: user.id,
                total_amount: total,
                payment_intent_id: intent.id.clone(),
            },
            &items,
        )
        .await?;
    tracing::info!(order_id = %order.id, intent_id = %intent.id, %total, "Order created");

    Ok(Json(json!({
        "orderId": intent.id,
        "amount": intent.amount,
        "currency": intent.currency,
        "keyId": gateway.key_id(),
        "internalOrderId": order.id,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetailItem {
    #[serde(flatten)]
    line: OrderLine,
    user_review: Option<Review>,
}

#[derive(Debug, Serialize)]
struct OrderDetail {
    #[serde(flatten)]
    order: Order,
    items: Vec<OrderDetailItem>,
}

async fn order_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetail>> {
    let order = state
        .store
        .order(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;
    if order.user_id != user.id {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }

    let mut items = Vec::new();
    for line in state.store.order_lines(order.id).await? {
        let user_review = state
            .store
            .user_product_review(user.id, line.item.product_id)
            .await?;
        items.push(OrderDetailItem { line, user_review });
    }

    Ok(Json(OrderDetail { order, items }))
}

//! Payment verification and the gateway webhook.
//!
//! Both paths settle the same order and may race; `complete_order` is a
//! compare-and-swap, so whichever caller wins applies the side effects and
//! the loser sees `AlreadyCompleted` and does nothing.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::domain::TransitionOutcome;
use crate::error::{ApiError, Result};
use crate::events::{self, OrderEvent};
use crate::models::{NewPayment, Order};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/verify", post(verify_payment))
        .route("/api/webhooks/razorpay", post(gateway_webhook))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>> {
    let gateway = state.gateway()?;
    if !gateway.payment_signature_valid(
        &req.gateway_order_id,
        &req.gateway_payment_id,
        &req.signature,
    ) {
        tracing::warn!(intent_id = %req.gateway_order_id, "Payment signature mismatch");
        return Err(ApiError::BadRequest("Invalid payment signature".to_string()));
    }

    // Not-the-owner reads the same as not-found.
    let order = state
        .store
        .order_by_intent(&req.gateway_order_id)
        .await?
        .filter(|o| o.user_id == user.id)
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

    match state.store.complete_order(order.id).await? {
        TransitionOutcome::Applied => {
            settle_completed(
                &state,
                &order,
                Some(req.gateway_payment_id),
                &req.gateway_order_id,
                gateway.currency(),
            )
            .await?;
            tracing::info!(order_id = %order.id, "Payment verified");
            Ok(Json(json!({ "success": true, "orderId": order.id })))
        }
        TransitionOutcome::AlreadyCompleted => Ok(Json(json!({
            "success": true,
            "message": "Payment already verified",
            "orderId": order.id,
        }))),
        TransitionOutcome::AlreadyFailed => {
            Err(ApiError::Conflict("Order is no longer payable".to_string()))
        }
    }
}

/// Side effects of a won `pending -> completed` swap: audit row, cart
/// clearing, event publication. Stock was already reduced inside the swap.
async fn settle_completed(
    state: &AppState,
    order: &Order,
    payment_id: Option<String>,
    intent_id: &str,
    currency: &str,
) -> Result<()> {
    state
        .store
        .record_payment(NewPayment {
            order_id: order.id,
            user_id: order.user_id,
            provider_payment_id: payment_id.clone(),
            provider_order_id: Some(intent_id.to_string()),
            amount: order.total_amount,
            currency: currency.to_string(),
            status: "captured".to_string(),
        })
        .await?;
    state.store.clear_cart(order.user_id).await?;
    events::publish(
        &state.nats,
        &OrderEvent::Completed {
            order_id: order.id,
            user_id: order.user_id,
            amount: order.total_amount,
            payment_id,
        },
    )
    .await;
    Ok(())
}

async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let gateway = state.gateway()?;
    let signature = headers
        .get("x-razorpay-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing signature".to_string()))?;
    // The signature covers the raw body bytes, before any JSON parsing.
    if !gateway.webhook_signature_valid(&body, signature) {
        tracing::warn!("Webhook signature mismatch");
        return Err(ApiError::BadRequest("Invalid webhook signature".to_string()));
    }

    match WebhookEvent::parse(&body) {
        WebhookEvent::Captured {
            payment_id,
            intent_id,
        } => match state.store.order_by_intent(&intent_id).await? {
            Some(order) => {
                if state.store.complete_order(order.id).await?.applied() {
                    settle_completed(
                        &state,
                        &order,
                        Some(payment_id),
                        &intent_id,
                        gateway.currency(),
                    )
                    .await?;
                    tracing::info!(order_id = %order.id, "Order completed via webhook");
                }
            }
            None => tracing::warn!(%intent_id, "Webhook for unknown payment intent"),
        },
        WebhookEvent::Failed { intent_id } => {
            match state.store.order_by_intent(&intent_id).await? {
                Some(order) => {
                    // No-op when the order already completed; terminal
                    // states are never overwritten.
                    if state.store.fail_order(order.id).await?.applied() {
                        events::publish(&state.nats, &OrderEvent::Failed { order_id: order.id })
                            .await;
                        tracing::info!(order_id = %order.id, "Order failed via webhook");
                    }
                }
                None => tracing::warn!(%intent_id, "Webhook for unknown payment intent"),
            }
        }
        WebhookEvent::Ignored(kind) => {
            tracing::debug!(event = %kind, "Ignoring webhook event");
        }
    }

    // Acknowledged whenever the signature passed, so the gateway stops
    // retrying even for events about orders we do not know.
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, PartialEq)]
enum WebhookEvent {
    Captured { payment_id: String, intent_id: String },
    Failed { intent_id: String },
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<PaymentWrap>,
}

#[derive(Debug, Deserialize)]
struct PaymentWrap {
    entity: Option<PaymentEntity>,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
}

impl WebhookEvent {
    /// Known kinds with the fields they need become variants; everything
    /// else, including bodies that do not parse, is `Ignored`.
    fn parse(body: &[u8]) -> Self {
        let Ok(envelope) = serde_json::from_slice::<WebhookEnvelope>(body) else {
            return Self::Ignored("unparseable".to_string());
        };
        let entity = envelope
            .payload
            .and_then(|p| p.payment)
            .and_then(|p| p.entity);
        match (envelope.event.as_str(), entity) {
            (
                "payment.captured",
                Some(PaymentEntity {
                    id,
                    order_id: Some(intent_id),
                }),
            ) => Self::Captured {
                payment_id: id,
                intent_id,
            },
            (
                "payment.failed",
                Some(PaymentEntity {
                    order_id: Some(intent_id),
                    ..
                }),
            ) => Self::Failed { intent_id },
            (event, _) => Self::Ignored(event.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_captured_event() {
        let body = serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_1" } } }
        });
        assert_eq!(
            WebhookEvent::parse(body.to_string().as_bytes()),
            WebhookEvent::Captured {
                payment_id: "pay_1".to_string(),
                intent_id: "order_1".to_string(),
            }
        );
    }

    #[test]
    fn test_parses_failed_event() {
        let body = serde_json::json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_2", "order_id": "order_2" } } }
        });
        assert_eq!(
            WebhookEvent::parse(body.to_string().as_bytes()),
            WebhookEvent::Failed {
                intent_id: "order_2".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_and_malformed_events_are_ignored() {
        let refunded = serde_json::json!({ "event": "payment.refunded" });
        assert_eq!(
            WebhookEvent::parse(refunded.to_string().as_bytes()),
            WebhookEvent::Ignored("payment.refunded".to_string())
        );
        let captured_without_order = serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_3" } } }
        });
        assert_eq!(
            WebhookEvent::parse(captured_without_order.to_string().as_bytes()),
            WebhookEvent::Ignored("payment.captured".to_string())
        );
        assert_eq!(
            WebhookEvent::parse(b"not json"),
            WebhookEvent::Ignored("unparseable".to_string())
        );
    }
}

//! Order lifecycle events published to NATS.
//!
//! Publishing is best effort: a missing or unreachable broker never fails
//! the request that produced the event.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OrderEvent {
    #[serde(rename_all = "camelCase")]
    Completed {
        order_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        payment_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Failed { order_id: Uuid },
}

impl OrderEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "orders.completed",
            Self::Failed { .. } => "orders.failed",
        }
    }
}

pub async fn publish(nats: &Option<async_nats::Client>, event: &OrderEvent) {
    let Some(client) = nats else { return };
    let payload = match serde_json::to_vec(event) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(?err, "Failed to encode order event");
            return;
        }
    };
    if let Err(err) = client.publish(event.subject(), payload.into()).await {
        tracing::warn!(?err, subject = event.subject(), "Failed to publish order event");
    }
}

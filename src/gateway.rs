//! Razorpay integration: order intents over HTTP and HMAC signature checks.
//!
//! Two signing keys are in play. Checkout verification signs
//! `"{gateway_order_id}|{gateway_payment_id}"` with the API key secret;
//! webhooks sign the exact raw request body with a separate webhook secret.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::GatewayConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Payment intent created on the gateway. `amount` is in minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

fn hmac_hex(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn hmac_matches(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// Signature Razorpay checkout hands back after a successful payment.
pub fn payment_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    hmac_hex(secret, format!("{gateway_order_id}|{gateway_payment_id}").as_bytes())
}

pub fn verify_payment_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    hmac_matches(
        secret,
        format!("{gateway_order_id}|{gateway_payment_id}").as_bytes(),
        signature,
    )
}

/// Webhook signatures cover the raw body bytes, not a re-serialization.
pub fn webhook_signature(secret: &str, body: &[u8]) -> String {
    hmac_hex(secret, body)
}

pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    hmac_matches(secret, body, signature)
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id the frontend needs to open checkout.
    fn key_id(&self) -> &str;

    fn currency(&self) -> &str;

    async fn create_intent(
        &self,
        amount_minor: i64,
        receipt: &str,
        user_id: Uuid,
    ) -> Result<GatewayIntent, GatewayError>;

    fn payment_signature_valid(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool;

    fn webhook_signature_valid(&self, body: &[u8], signature: &str) -> bool;
}

pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    currency: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, currency: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            currency,
        }
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        receipt: &str,
        user_id: Uuid,
    ) -> Result<GatewayIntent, GatewayError> {
        let url = format!("{}/v1/orders", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": self.currency,
                "receipt": receipt,
                "notes": { "userId": user_id },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<GatewayIntent>().await?)
    }

    fn payment_signature_valid(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        verify_payment_signature(
            &self.config.key_secret,
            gateway_order_id,
            gateway_payment_id,
            signature,
        )
    }

    fn webhook_signature_valid(&self, body: &[u8], signature: &str) -> bool {
        verify_webhook_signature(&self.config.webhook_secret, body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_signature_round_trip() {
        let sig = payment_signature("secret", "order_abc", "pay_xyz");
        assert!(verify_payment_signature("secret", "order_abc", "pay_xyz", &sig));
        assert!(!verify_payment_signature("secret", "order_abc", "pay_other", &sig));
        assert!(!verify_payment_signature("wrong", "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn test_signature_rejects_non_hex() {
        assert!(!verify_payment_signature("secret", "order_abc", "pay_xyz", "not hex!"));
        assert!(!verify_payment_signature("secret", "order_abc", "pay_xyz", ""));
    }

    #[test]
    fn test_webhook_signature_covers_raw_bytes() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = webhook_signature("whsec", body);
        assert!(verify_webhook_signature("whsec", body, &sig));
        // Same JSON, different bytes.
        let reformatted = br#"{ "event": "payment.captured" }"#;
        assert!(!verify_webhook_signature("whsec", reformatted, &sig));
    }
}

//! Environment-backed service configuration, read once at startup.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub currency: String,
    pub nats_url: Option<String>,
    pub gateway: Option<GatewayConfig>,
    /// Development mode relaxes cookies and includes error detail in responses.
    pub dev_mode: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("PORT must be a number")?;
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using an insecure default");
            "change-me-in-production".to_string()
        });
        let dev_mode = std::env::var("APP_ENV").map(|e| e != "production").unwrap_or(true);

        let gateway = match (
            std::env::var("RAZORPAY_KEY_ID"),
            std::env::var("RAZORPAY_KEY_SECRET"),
            std::env::var("RAZORPAY_WEBHOOK_SECRET"),
        ) {
            (Ok(key_id), Ok(key_secret), Ok(webhook_secret)) => Some(GatewayConfig {
                key_id,
                key_secret,
                webhook_secret,
                api_url: std::env::var("GATEWAY_API_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            jwt_secret,
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            nats_url: std::env::var("NATS_URL").ok(),
            gateway,
            dev_mode,
        })
    }
}

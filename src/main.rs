//! DevMart - Digital Products Marketplace

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devmart::gateway::{GatewayClient, PaymentGateway};
use devmart::storage::PgStore;
use devmart::{routes, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    devmart::error::expose_error_details(config.dev_mode);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(?err, "NATS unavailable, events disabled");
                None
            }
        },
        None => None,
    };

    let gateway: Option<Arc<dyn PaymentGateway>> = config
        .gateway
        .clone()
        .map(|cfg| Arc::new(GatewayClient::new(cfg, config.currency.clone())) as _);
    if gateway.is_none() {
        tracing::warn!("Razorpay credentials not set, payment routes will return 503");
    }

    let port = config.port;
    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        gateway,
        nats,
        config: Arc::new(config),
    };
    let app = routes::router(state);

    tracing::info!("🚀 DevMart listening on 0.0.0.0:{}", port);
    axum::serve(
        tokio::net::TcpListener::bind(("0.0.0.0", port)).await?,
        app,
    )
    .await?;
    Ok(())
}

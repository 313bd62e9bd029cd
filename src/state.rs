//! Shared application state threaded through every handler.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{ApiError, Result};
use crate::gateway::PaymentGateway;
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub nats: Option<async_nats::Client>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Payment gateway, or 503 when the service runs without credentials.
    pub fn gateway(&self) -> Result<&dyn PaymentGateway> {
        self.gateway
            .as_deref()
            .ok_or(ApiError::PaymentsUnavailable)
    }
}

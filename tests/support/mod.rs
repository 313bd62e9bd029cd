//! Shared harness: the full router wired to the in-memory store and an
//! offline payment gateway with real HMAC signature checks.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use devmart::gateway::{self, GatewayError, GatewayIntent, PaymentGateway};
use devmart::models::{NewProduct, Product, User};
use devmart::storage::{MemoryStore, Store};
use devmart::{auth, AppConfig, AppState};

pub const JWT_SECRET: &str = "test-secret";
pub const KEY_SECRET: &str = "test-key-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Gateway that never leaves the process. Signatures use the production
/// HMAC scheme with the test secrets above.
pub struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    fn key_id(&self) -> &str {
        "rzp_test_stub"
    }

    fn currency(&self) -> &str {
        "INR"
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        receipt: &str,
        _user_id: Uuid,
    ) -> Result<GatewayIntent, GatewayError> {
        Ok(GatewayIntent {
            id: format!("order_stub_{receipt}"),
            amount: amount_minor,
            currency: "INR".to_string(),
        })
    }

    fn payment_signature_valid(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        gateway::verify_payment_signature(
            KEY_SECRET,
            gateway_order_id,
            gateway_payment_id,
            signature,
        )
    }

    fn webhook_signature_valid(&self, body: &[u8], signature: &str) -> bool {
        gateway::verify_webhook_signature(WEBHOOK_SECRET, body, signature)
    }
}

/// Gateway whose intent creation always fails. Signature checks pass so the
/// failure surfaces from the HTTP call, not the auth path.
pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    fn key_id(&self) -> &str {
        "rzp_test_failing"
    }

    fn currency(&self) -> &str {
        "INR"
    }

    async fn create_intent(
        &self,
        _amount_minor: i64,
        _receipt: &str,
        _user_id: Uuid,
    ) -> Result<GatewayIntent, GatewayError> {
        Err(GatewayError::Api {
            status: 502,
            body: "upstream unavailable".to_string(),
        })
    }

    fn payment_signature_valid(&self, _: &str, _: &str, _: &str) -> bool {
        true
    }

    fn webhook_signature_valid(&self, _: &[u8], _: &str) -> bool {
        true
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        port: 0,
        database_url: String::new(),
        jwt_secret: JWT_SECRET.to_string(),
        currency: "INR".to_string(),
        nats_url: None,
        gateway: None,
        dev_mode: true,
    }
}

pub fn app_with_gateway(
    gateway: Option<Arc<dyn PaymentGateway>>,
) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        store: store.clone(),
        gateway,
        nats: None,
        config: Arc::new(test_config()),
    };
    (devmart::routes::router(state), store)
}

pub fn test_app() -> (Router, Arc<MemoryStore>) {
    app_with_gateway(Some(Arc::new(StubGateway)))
}

pub fn app_without_gateway() -> (Router, Arc<MemoryStore>) {
    app_with_gateway(None)
}

pub fn request(method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

pub async fn body_json(res: Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Token value from the `Set-Cookie` session header.
pub fn session_cookie(res: &Response) -> Option<String> {
    let raw = res.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let (pair, _) = raw.split_once(';')?;
    let (name, value) = pair.split_once('=')?;
    (name == "token" && !value.is_empty()).then(|| value.to_string())
}

/// Signs up a fresh account and returns its id plus a session token.
pub async fn signup_user(app: &Router, email: &str) -> (Uuid, String) {
    let res = send(
        app,
        request(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "email": email, "password": "password123", "name": "Test User" })),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = session_cookie(&res).expect("signup sets the session cookie");
    let body = body_json(res).await;
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    (id, token)
}

/// Admin session token. The back office trusts the role claim, so the
/// account does not need a store row.
pub fn admin_token() -> String {
    let now = Utc::now();
    let admin = User {
        id: Uuid::now_v7(),
        email: "admin@example.com".to_string(),
        name: "Admin".to_string(),
        password_hash: String::new(),
        phone: None,
        address: None,
        role: "admin".to_string(),
        avatar: None,
        created_at: now,
        updated_at: now,
    };
    auth::issue_token(&admin, JWT_SECRET).unwrap()
}

pub async fn seed_product(store: &Arc<MemoryStore>, title: &str, price: &str, stock: i32) -> Product {
    store
        .create_product(NewProduct {
            title: title.to_string(),
            description: format!("{title} for tests"),
            short_description: None,
            category: "Templates".to_string(),
            price: price.parse().unwrap(),
            image: None,
            author: None,
            stock_count: stock,
            is_featured: false,
            tags: json!([]),
            license_type: "standard".to_string(),
            version: None,
        })
        .await
        .unwrap()
}

pub async fn add_to_cart(app: &Router, token: &str, product_id: Uuid, quantity: i32) {
    let res = send(
        app,
        request(
            "POST",
            "/api/cart",
            Some(token),
            Some(json!({ "productId": product_id, "quantity": quantity })),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
}

/// Runs checkout for whatever is in the cart and returns the creation
/// response body (gateway order id, amount, internal order id).
pub async fn create_order(app: &Router, token: &str) -> Value {
    let res = send(app, request("POST", "/api/orders/create", Some(token), None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

/// Checkout-style verification payload for a created order.
pub fn verify_payload(gateway_order_id: &str, payment_id: &str) -> Value {
    json!({
        "gatewayOrderId": gateway_order_id,
        "gatewayPaymentId": payment_id,
        "signature": gateway::payment_signature(KEY_SECRET, gateway_order_id, payment_id),
    })
}

/// Signed webhook request for the given event body.
pub fn webhook_request(event: &Value) -> Request<Body> {
    let body = event.to_string();
    let signature = gateway::webhook_signature(WEBHOOK_SECRET, body.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/razorpay")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-razorpay-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

pub fn captured_event(payment_id: &str, gateway_order_id: &str) -> Value {
    json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": payment_id, "order_id": gateway_order_id } } }
    })
}

pub fn failed_event(payment_id: &str, gateway_order_id: &str) -> Value {
    json!({
        "event": "payment.failed",
        "payload": { "payment": { "entity": { "id": payment_id, "order_id": gateway_order_id } } }
    })
}

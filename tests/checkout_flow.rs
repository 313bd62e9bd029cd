//! End-to-end checkout: stock gating, signed verification, webhook
//! reconciliation and exactly-once completion.

mod support;

use axum::http::StatusCode;
use devmart::models::ProductPatch;
use devmart::storage::Store;
use serde_json::json;
use support::*;
use uuid::Uuid;

async fn product_stock(app: &axum::Router, id: Uuid) -> i64 {
    let res = send(app, request("GET", &format!("/api/products/{id}"), None, None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["stockCount"].as_i64().unwrap()
}

async fn order_status(app: &axum::Router, token: &str, id: &str) -> String {
    let res = send(app, request("GET", &format!("/api/orders/{id}"), Some(token), None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["status"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_checkout_happy_path() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    let icons = seed_product(&store, "Icon Pack", "5.00", 1).await;

    add_to_cart(&app, &token, kit.id, 2).await;
    add_to_cart(&app, &token, icons.id, 1).await;

    let created = create_order(&app, &token).await;
    assert_eq!(created["amount"], 2500);
    assert_eq!(created["currency"], "INR");
    assert_eq!(created["keyId"], "rzp_test_stub");
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let internal_id = created["internalOrderId"].as_str().unwrap().to_string();

    // Nothing settles until verification.
    assert_eq!(product_stock(&app, kit.id).await, 5);
    assert_eq!(order_status(&app, &token, &internal_id).await, "pending");

    let res = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&token),
            Some(verify_payload(&gateway_order_id, "pay_001")),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["orderId"].as_str().unwrap(), internal_id);

    assert_eq!(order_status(&app, &token, &internal_id).await, "completed");
    assert_eq!(product_stock(&app, kit.id).await, 3);
    assert_eq!(product_stock(&app, icons.id).await, 0);

    let cart = send(&app, request("GET", "/api/cart", Some(&token), None)).await;
    assert_eq!(body_json(cart).await, json!([]));
}

#[tokio::test]
async fn test_order_rejected_when_stock_insufficient() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 3).await;
    add_to_cart(&app, &token, kit.id, 3).await;

    // Stock shrank after the items went into the cart.
    store
        .update_product(
            kit.id,
            ProductPatch {
                stock_count: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let res = send(&app, request("POST", "/api/orders/create", Some(&token), None)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res).await["message"],
        "Site Kit is currently out of stock"
    );

    let orders = send(&app, request("GET", "/api/orders", Some(&token), None)).await;
    assert_eq!(body_json(orders).await, json!([]));
}

#[tokio::test]
async fn test_empty_cart_cannot_checkout() {
    let (app, _) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let res = send(&app, request("POST", "/api/orders/create", Some(&token), None)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["message"], "Cart is empty");
}

#[tokio::test]
async fn test_verify_rejects_invalid_signature() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 1).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap();
    let internal_id = created["internalOrderId"].as_str().unwrap();

    let res = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&token),
            Some(json!({
                "gatewayOrderId": gateway_order_id,
                "gatewayPaymentId": "pay_001",
                "signature": "deadbeef",
            })),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["message"], "Invalid payment signature");

    assert_eq!(order_status(&app, &token, internal_id).await, "pending");
    assert_eq!(product_stock(&app, kit.id).await, 5);
    let cart = send(&app, request("GET", "/api/cart", Some(&token), None)).await;
    assert_eq!(body_json(cart).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_verify_only_settles_once() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 2).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let payload = verify_payload(&gateway_order_id, "pay_001");

    let first = send(&app, request("POST", "/api/payments/verify", Some(&token), Some(payload.clone()))).await;
    assert_eq!(first.status(), StatusCode::OK);
    let second = send(&app, request("POST", "/api/payments/verify", Some(&token), Some(payload))).await;
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Payment already verified");

    assert_eq!(product_stock(&app, kit.id).await, 3);
}

#[tokio::test]
async fn test_verify_requires_order_ownership() {
    let (app, store) = test_app();
    let (_, buyer) = signup_user(&app, "buyer@example.com").await;
    let (_, other) = signup_user(&app, "other@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &buyer, kit.id, 1).await;
    let created = create_order(&app, &buyer).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();

    let res = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&other),
            Some(verify_payload(&gateway_order_id, "pay_001")),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await["message"], "Order not found");
    assert_eq!(product_stock(&app, kit.id).await, 5);
}

#[tokio::test]
async fn test_webhook_completes_order() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 2).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let internal_id = created["internalOrderId"].as_str().unwrap().to_string();

    let event = captured_event("pay_001", &gateway_order_id);
    let res = send(&app, webhook_request(&event)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["success"], true);

    assert_eq!(order_status(&app, &token, &internal_id).await, "completed");
    assert_eq!(product_stock(&app, kit.id).await, 3);
    let cart = send(&app, request("GET", "/api/cart", Some(&token), None)).await;
    assert_eq!(body_json(cart).await, json!([]));

    // Gateway retries deliver the same event again.
    let res = send(&app, webhook_request(&event)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(product_stock(&app, kit.id).await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_and_webhook_race_settles_once() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 2).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let internal_id = created["internalOrderId"].as_str().unwrap().to_string();

    let verify = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&token),
            Some(verify_payload(&gateway_order_id, "pay_001")),
        ),
    );
    let webhook = send(&app, webhook_request(&captured_event("pay_001", &gateway_order_id)));
    let (verify_res, webhook_res) = tokio::join!(verify, webhook);
    assert_eq!(verify_res.status(), StatusCode::OK);
    assert_eq!(webhook_res.status(), StatusCode::OK);

    assert_eq!(order_status(&app, &token, &internal_id).await, "completed");
    assert_eq!(product_stock(&app, kit.id).await, 3);
}

#[tokio::test]
async fn test_failure_webhook_never_reverts_completed_order() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 1).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let internal_id = created["internalOrderId"].as_str().unwrap().to_string();

    let res = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&token),
            Some(verify_payload(&gateway_order_id, "pay_001")),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(&app, webhook_request(&failed_event("pay_001", &gateway_order_id))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(order_status(&app, &token, &internal_id).await, "completed");
    assert_eq!(product_stock(&app, kit.id).await, 4);
}

#[tokio::test]
async fn test_failed_order_is_no_longer_payable() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 1).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let internal_id = created["internalOrderId"].as_str().unwrap().to_string();

    let res = send(&app, webhook_request(&failed_event("pay_001", &gateway_order_id))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(order_status(&app, &token, &internal_id).await, "failed");

    let res = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&token),
            Some(verify_payload(&gateway_order_id, "pay_001")),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(res).await["message"], "Order is no longer payable");
    assert_eq!(product_stock(&app, kit.id).await, 5);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() {
    let (app, store) = test_app();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 1).await;
    let created = create_order(&app, &token).await;
    let gateway_order_id = created["orderId"].as_str().unwrap().to_string();
    let internal_id = created["internalOrderId"].as_str().unwrap().to_string();
    let event = captured_event("pay_001", &gateway_order_id);

    let unsigned = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/razorpay")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(event.to_string()))
        .unwrap();
    let res = send(&app, unsigned).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["message"], "Missing signature");

    let forged = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/razorpay")
        .header("content-type", "application/json")
        .header("x-razorpay-signature", "deadbeef")
        .body(axum::body::Body::from(event.to_string()))
        .unwrap();
    let res = send(&app, forged).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["message"], "Invalid webhook signature");

    assert_eq!(order_status(&app, &token, &internal_id).await, "pending");
    assert_eq!(product_stock(&app, kit.id).await, 5);
}

#[tokio::test]
async fn test_webhook_acknowledges_unknown_intents() {
    let (app, _) = test_app();
    let res = send(&app, webhook_request(&captured_event("pay_x", "order_unknown"))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["success"], true);

    // Event kinds we do not handle are acknowledged too.
    let res = send(&app, webhook_request(&json!({ "event": "refund.processed" }))).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_payments_unavailable_without_gateway() {
    let (app, store) = app_without_gateway();
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 1).await;

    let res = send(&app, request("POST", "/api/orders/create", Some(&token), None)).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(res).await["message"], "Payment gateway not configured");

    let res = send(
        &app,
        request(
            "POST",
            "/api/payments/verify",
            Some(&token),
            Some(verify_payload("order_x", "pay_x")),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_gateway_failure_creates_no_order() {
    let (app, store) = app_with_gateway(Some(std::sync::Arc::new(FailingGateway)));
    let (_, token) = signup_user(&app, "buyer@example.com").await;
    let kit = seed_product(&store, "Site Kit", "10.00", 5).await;
    add_to_cart(&app, &token, kit.id, 1).await;

    let res = send(&app, request("POST", "/api/orders/create", Some(&token), None)).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(res).await["message"], "Failed to create order");

    let orders = send(&app, request("GET", "/api/orders", Some(&token), None)).await;
    assert_eq!(body_json(orders).await, json!([]));
}

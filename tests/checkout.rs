//! Checkout flow tests, including the full purchase path through to validation.

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::*;

use licensehub::licensing::is_well_formed_key;

fn checkout_body() -> serde_json::Value {
    json!({
        "productId": "forex-ma-bot",
        "amountUSD": 299,
        "buyerEmail": "Buyer@Example.com"
    })
}

#[tokio::test]
async fn test_purchase_end_to_end() {
    let app = create_test_app();

    // 1. Checkout
    let (status, body) = app.send(post_json("/checkout", checkout_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let order_id = body["orderId"].as_str().unwrap().to_string();
    let txn_id = body["txnId"].as_str().unwrap().to_string();
    assert!(body["checkoutUrl"].as_str().unwrap().starts_with("https://"));

    let request = app.gateway.last_request().unwrap();
    assert_eq!(request.amount_usd, "299.00");
    assert_eq!(request.currency, "USDT.TRC20");
    assert_eq!(request.order_id, order_id);
    assert_eq!(request.ipn_url, format!("{}/payment/webhook", BASE_URL));

    let order = app.order(&order_id);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount_cents, 29_900);
    assert_eq!(order.gateway_txn_id.as_deref(), Some(txn_id.as_str()));

    // 2. Gateway reports completion
    let (status, _) = app.send(signed_ipn(&order_id, &txn_id, 110)).await;
    assert_eq!(status, StatusCode::OK);

    let order = app.order(&order_id);
    assert_eq!(order.status, OrderStatus::Complete);
    let key = order.license_key.unwrap();
    assert!(is_well_formed_key(&key), "bad key format: {}", key);
    assert_eq!(key.len(), 35);

    // 3. Buyer receives the key
    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "Buyer@Example.com");
    assert!(sent[0].body.contains(&key));
    assert!(sent[0].body.contains("https://downloads.test/forex-ma-bot"));

    let license = app.licenses().get(&key).cloned().unwrap();
    assert_eq!(license.email, "buyer@example.com");

    // 4. Client activates
    let (status, body) = app
        .send(post_json(
            "/license/validate",
            json!({ "licenseKey": key, "hardwareFingerprint": "1111-2222-3333-4444" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["daysRemaining"], 365);

    // 5. Public status view does not leak the key
    let (status, body) = app.send(get(&format!("/checkout/{}", order_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert!(body.get("licenseKey").is_none());
    assert!(!body.to_string().contains(&key));
}

#[tokio::test]
async fn test_custom_currency_and_decimal_amount() {
    let app = create_test_app();
    let (status, body) = app
        .send(post_json(
            "/checkout",
            json!({
                "productId": "forex-ma-bot",
                "amountUSD": 49.5,
                "buyerEmail": "buyer@example.com",
                "currency": "btc"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = app.order(body["orderId"].as_str().unwrap());
    assert_eq!(order.amount_cents, 4_950);
    assert_eq!(order.currency, "BTC");
    assert_eq!(app.gateway.last_request().unwrap().amount_usd, "49.50");
}

#[tokio::test]
async fn test_invalid_checkout_requests_are_400() {
    let app = create_test_app();
    let cases = [
        json!({ "productId": "forex-ma-bot", "amountUSD": 0, "buyerEmail": "buyer@example.com" }),
        json!({ "productId": "forex-ma-bot", "amountUSD": -5, "buyerEmail": "buyer@example.com" }),
        json!({ "productId": "forex-ma-bot", "amountUSD": 1.999, "buyerEmail": "buyer@example.com" }),
        json!({ "productId": "forex-ma-bot", "amountUSD": "299", "buyerEmail": "buyer@example.com" }),
        json!({ "productId": "forex-ma-bot", "amountUSD": 299, "buyerEmail": "not-an-email" }),
        json!({ "productId": "", "amountUSD": 299, "buyerEmail": "buyer@example.com" }),
        json!({ "productId": "forex-ma-bot", "amountUSD": 299, "buyerEmail": "buyer@example.com", "coupon": "x" }),
    ];

    for body in cases {
        let (status, json) = app.send(post_json("/checkout", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(json["reason"], "INVALID_REQUEST");
    }
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn test_gateway_error_leaves_order_created_and_retry_succeeds() {
    let app = create_test_app();
    app.gateway.push(GatewayReply::Error);

    let (status, body) = app.send(post_json("/checkout", checkout_body())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["reason"], "GATEWAY_ERROR");

    let conn = app.state.db.get().unwrap();
    let order_id: String = conn
        .query_row("SELECT id FROM orders", [], |row| row.get(0))
        .unwrap();
    drop(conn);

    let order = app.order(&order_id);
    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.gateway_txn_id.is_none());

    let (status, body) = app
        .send(post_json(&format!("/checkout/{}/retry", order_id), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], order_id);
    assert_eq!(app.order(&order_id).status, OrderStatus::Pending);
    assert_eq!(app.gateway.calls(), 2);

    // A second retry has nothing to do.
    let (status, body) = app
        .send(post_json(&format!("/checkout/{}/retry", order_id), json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "CONFLICT");
}

#[tokio::test]
async fn test_gateway_timeout_is_504() {
    let app = create_test_app();
    app.gateway.push(GatewayReply::Timeout);

    let (status, body) = app.send(post_json("/checkout", checkout_body())).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["reason"], "GATEWAY_TIMEOUT");
}

#[tokio::test]
async fn test_unknown_checkout_is_404() {
    let app = create_test_app();
    let (status, body) = app.send(get("/checkout/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "NOT_FOUND");
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let (status, body) = app.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

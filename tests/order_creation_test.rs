//! Order placement through the public HTTP API: pricing, variant rules and
//! stock reservation.

mod common;

use axum::http::Method;
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn variant_order_is_priced_from_base_and_modifier() {
    let app = TestApp::new().await;
    let product = app.seed_product("Custom Keychain", dec!(299), 0).await;
    let variant = app
        .seed_variant(product.id, "Acrylic", "Heart", dec!(100), 5)
        .await;

    let response = app.place_order(product.id, Some(variant.id), 2).await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;

    assert_eq!(body["success"], true);
    assert_eq!(decimal(&body["data"]["unit_price"]), dec!(399));
    assert_eq!(decimal(&body["data"]["total_price"]), dec!(798));
    assert_eq!(body["data"]["status"], "PAYMENT_PENDING");
    assert_eq!(body["data"]["variant_label"], "Acrylic / Heart");
    assert_eq!(app.variant_stock(variant.id).await, 3);

    // The persisted order matches what creation reported.
    let order_id = body["data"]["order_id"].as_str().unwrap();
    let fetched = response_json(
        app.request(Method::GET, &format!("/api/v1/orders/{}", order_id), None, None)
            .await,
    )
    .await;
    assert_eq!(decimal(&fetched["data"]["total_price"]), dec!(798));
    assert_eq!(fetched["data"]["status"], "PAYMENT_PENDING");
    assert_eq!(fetched["data"]["product_name"], "Custom Keychain");
    assert_eq!(fetched["data"]["material"], "Acrylic");
    assert_eq!(fetched["data"]["shape"], "Heart");
}

#[tokio::test]
async fn product_with_variants_requires_a_variant() {
    let app = TestApp::new().await;
    let product = app.seed_product("Badge", dec!(150), 10).await;
    let variant = app.seed_variant(product.id, "Metal", "Round", dec!(0), 4).await;

    let response = app.place_order(product.id, None, 1).await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .ends_with("variant required"));

    assert_eq!(app.variant_stock(variant.id).await, 4);
    assert_eq!(app.product_stock(product.id).await, 10);
}

#[tokio::test]
async fn out_of_stock_product_is_refused() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sticker", dec!(49), 0).await;

    let response = app.place_order(product.id, None, 1).await;
    assert_eq!(response.status(), 409);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Out of stock");
}

#[tokio::test]
async fn partial_stock_reports_available_and_requested() {
    let app = TestApp::new().await;
    let product = app.seed_product("Poster", dec!(199), 1).await;

    let response = app.place_order(product.id, None, 3).await;
    assert_eq!(response.status(), 409);
    let body = response_json(response).await;
    assert_eq!(
        body["message"],
        "Insufficient stock. Available: 1, Requested: 3"
    );
    assert_eq!(app.product_stock(product.id).await, 1);
}

#[tokio::test]
async fn variant_from_another_product_is_not_found() {
    let app = TestApp::new().await;
    let product = app.seed_product("Mug", dec!(250), 0).await;
    let other = app.seed_product("Cup", dec!(250), 0).await;
    let foreign = app.seed_variant(other.id, "Ceramic", "Tall", dec!(0), 5).await;
    app.seed_variant(product.id, "Ceramic", "Short", dec!(0), 5).await;

    let response = app.place_order(product.id, Some(foreign.id), 1).await;
    assert_eq!(response.status(), 404);
    assert_eq!(app.variant_stock(foreign.id).await, 5);
}

#[tokio::test]
async fn inactive_product_cannot_be_ordered() {
    let app = TestApp::new().await;
    let product = app.seed_product("Retired Pin", dec!(99), 10).await;
    let response = app
        .request_as_admin(
            Method::DELETE,
            &format!("/api/v1/products/{}", product.id),
            None,
        )
        .await;
    assert_eq!(response.status(), 204);

    let response = app.place_order(product.id, None, 1).await;
    assert_eq!(response.status(), 404);
    assert_eq!(app.product_stock(product.id).await, 10);
}

#[tokio::test]
async fn form_validation_rejects_bad_input() {
    let app = TestApp::new().await;
    let product = app.seed_product("Keyring", dec!(120), 10).await;

    let too_many = app.place_order(product.id, None, 11).await;
    assert_eq!(too_many.status(), 400);

    let none = app.place_order(product.id, None, 0).await;
    assert_eq!(none.status(), 400);

    let bad_phone = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_name": "Asha",
                "phone": "call me",
                "product_id": product.id,
                "quantity": 1,
            })),
            None,
        )
        .await;
    assert_eq!(bad_phone.status(), 400);

    assert_eq!(app.product_stock(product.id).await, 10);
}

#[tokio::test]
async fn client_supplied_prices_are_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Frame", dec!(500), 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_name": "Asha",
                "phone": "9876543210",
                "product_id": product.id,
                "quantity": 1,
                "total_price": "1.00",
            })),
            None,
        )
        .await;
    assert!(response.status().is_client_error());
    assert_eq!(app.product_stock(product.id).await, 10);
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let app = TestApp::new().await;
    let product = app.seed_product("Limited Print", dec!(300), 3).await;

    let attempts = (0..8).map(|_| app.place_order(product.id, None, 1));
    let responses = futures::future::join_all(attempts).await;

    let created = responses.iter().filter(|r| r.status() == 201).count();
    let refused = responses.iter().filter(|r| r.status() == 409).count();
    assert_eq!(created, 3);
    assert_eq!(refused, 5);
    assert_eq!(app.product_stock(product.id).await, 0);
}

#[tokio::test]
async fn malformed_body_gets_the_error_envelope() {
    let app = TestApp::new().await;
    let product = app.seed_product("Keyring", dec!(120), 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "phone": "9876543210",
                "product_id": product.id,
                "quantity": 1,
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), 400);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("customer_name"));
    assert!(body["request_id"].is_string());

    let unknown_field = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_name": "Asha",
                "phone": "9876543210",
                "product_id": product.id,
                "quantity": 1,
                "total_price": "1.00",
            })),
            None,
        )
        .await;
    assert_eq!(unknown_field.status(), 400);
    assert_eq!(app.product_stock(product.id).await, 10);
}

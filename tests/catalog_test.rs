//! Catalog visibility, admin product edits, variant stock and stats.

mod common;

use axum::http::Method;
use common::{decimal, response_json, TestApp, ADMIN_KEY};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn public_listing_hides_inactive_products() {
    let app = TestApp::new().await;
    let visible = app.seed_product("Acrylic Stand", dec!(349), 4).await;
    let hidden = app.seed_product("Old Stand", dec!(299), 4).await;
    app.seed_variant(visible.id, "Acrylic", "Square", dec!(50), 2)
        .await;

    let response = app
        .request_as_admin(
            Method::PATCH,
            &format!("/api/v1/products/{}", hidden.id),
            Some(json!({ "action": "toggle_active" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["is_active"], false);

    let public = response_json(app.request(Method::GET, "/api/v1/products", None, None).await).await;
    let products = public["data"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["name"], "Acrylic Stand");
    assert_eq!(products[0]["variants"][0]["label"], "Acrylic / Square");

    let admin = response_json(app.request_as_admin(Method::GET, "/api/v1/products", None).await).await;
    assert_eq!(admin["data"].as_array().unwrap().len(), 2);

    // A wrong key is treated as anonymous for listing.
    let wrong = response_json(
        app.request(Method::GET, "/api/v1/products", None, Some("nope-nope-nope"))
            .await,
    )
    .await;
    assert_eq!(wrong["data"].as_array().unwrap().len(), 1);

    let single = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", hidden.id),
            None,
            None,
        )
        .await;
    assert_eq!(single.status(), 404);
}

#[tokio::test]
async fn product_management_requires_admin() {
    let app = TestApp::new().await;
    let payload = json!({
        "name": "Keychain",
        "category": "Keychains",
        "base_price": "199",
        "stock": 10,
    });

    let anonymous = app
        .request(Method::POST, "/api/v1/products", Some(payload.clone()), None)
        .await;
    assert_eq!(anonymous.status(), 401);

    let created = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(payload),
            Some(ADMIN_KEY),
        )
        .await;
    assert_eq!(created.status(), 201);
    let body = response_json(created).await;
    assert_eq!(decimal(&body["data"]["base_price"]), dec!(199));
    assert_eq!(decimal(&body["data"]["customization_fee"]), dec!(20));
    assert_eq!(body["data"]["is_active"], true);
}

#[tokio::test]
async fn price_and_stock_updates() {
    let app = TestApp::new().await;
    let product = app.seed_product("Badge", dec!(100), 1).await;
    let uri = format!("/api/v1/products/{}", product.id);

    let body = response_json(
        app.request_as_admin(
            Method::PATCH,
            &uri,
            Some(json!({ "action": "update_price", "value": "120" })),
        )
        .await,
    )
    .await;
    assert_eq!(decimal(&body["data"]["base_price"]), dec!(120));

    let body = response_json(
        app.request_as_admin(
            Method::PATCH,
            &uri,
            Some(json!({ "action": "update_stock", "value": 25 })),
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["stock"], 25);

    let negative = app
        .request_as_admin(
            Method::PATCH,
            &uri,
            Some(json!({ "action": "update_stock", "value": -1 })),
        )
        .await;
    assert_eq!(negative.status(), 400);
    assert_eq!(app.product_stock(product.id).await, 25);
}

#[tokio::test]
async fn variant_stock_is_set_absolutely() {
    let app = TestApp::new().await;
    let product = app.seed_product("Charm", dec!(80), 0).await;
    let variant = app.seed_variant(product.id, "Resin", "Star", dec!(10), 3).await;
    let uri = format!("/api/v1/variants/{}/stock", variant.id);

    let response = app
        .request_as_admin(Method::PATCH, &uri, Some(json!({ "stock": 12 })))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(app.variant_stock(variant.id).await, 12);

    let response = app
        .request_as_admin(Method::PATCH, &uri, Some(json!({ "stock": -3 })))
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request(Method::PATCH, &uri, Some(json!({ "stock": 0 })), None)
        .await;
    assert_eq!(response.status(), 401);
    assert_eq!(app.variant_stock(variant.id).await, 12);

    let missing = app
        .request_as_admin(
            Method::PATCH,
            &format!("/api/v1/variants/{}/stock", uuid::Uuid::new_v4()),
            Some(json!({ "stock": 1 })),
        )
        .await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn variant_needs_material_or_shape() {
    let app = TestApp::new().await;
    let product = app.seed_product("Frame", dec!(300), 0).await;

    let response = app
        .request_as_admin(
            Method::POST,
            &format!("/api/v1/products/{}/variants", product.id),
            Some(json!({ "price_modifier": "10", "stock": 1 })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn stats_count_units_of_non_rejected_orders() {
    let app = TestApp::new().await;
    let product = app.seed_product("Poster", dec!(150), 0).await;
    let a4 = app.seed_variant(product.id, "Matte", "A4", dec!(0), 10).await;
    let a3 = app.seed_variant(product.id, "Matte", "A3", dec!(50), 10).await;

    app.place_order_ok(product.id, Some(a4.id), 2).await;
    app.place_order_ok(product.id, Some(a3.id), 3).await;
    let rejected = app.place_order_ok(product.id, Some(a3.id), 1).await;
    app.set_status(rejected, "REJECTED").await;

    let anonymous = app
        .request(Method::GET, "/api/v1/product-stats", None, None)
        .await;
    assert_eq!(anonymous.status(), 401);

    let body = response_json(
        app.request_as_admin(Method::GET, "/api/v1/product-stats", None)
            .await,
    )
    .await;
    let stats = &body["data"][0];
    assert_eq!(stats["name"], "Poster");
    assert_eq!(stats["variant_count"], 2);
    assert_eq!(stats["stock"], 15);
    assert_eq!(stats["orders_sold"], 2);
    assert_eq!(stats["units_sold"], 5);
}

#[tokio::test]
async fn admin_login_checks_the_key() {
    let app = TestApp::new().await;

    let ok = app
        .request_as_admin(Method::POST, "/api/v1/admin/login", None)
        .await;
    assert_eq!(ok.status(), 200);
    let body = response_json(ok).await;
    assert_eq!(body["data"]["ok"], true);

    let bad = app
        .request(
            Method::POST,
            "/api/v1/admin/login",
            None,
            Some("wrong-key-wrong-key"),
        )
        .await;
    assert_eq!(bad.status(), 401);
}

#[tokio::test]
async fn health_and_status_respond() {
    let app = TestApp::new().await;

    let health = response_json(app.request(Method::GET, "/api/v1/health", None, None).await).await;
    assert_eq!(health["data"]["checks"]["database"], "healthy");

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert!(response.headers().contains_key("x-request-id"));
    let status = response_json(response).await;
    assert_eq!(status["data"]["service"], "storefront-api");
    assert!(status["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn price_cut_cannot_push_a_variant_below_zero() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lamp", dec!(100), 0).await;
    app.seed_variant(product.id, "Wood", "Small", dec!(-60), 3).await;
    let uri = format!("/api/v1/products/{}", product.id);

    let response = app
        .request_as_admin(
            Method::PATCH,
            &uri,
            Some(json!({ "action": "update_price", "value": "40" })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let body = response_json(
        app.request_as_admin(
            Method::PATCH,
            &uri,
            Some(json!({ "action": "update_price", "value": "60" })),
        )
        .await,
    )
    .await;
    assert_eq!(decimal(&body["data"]["base_price"]), dec!(60));
}

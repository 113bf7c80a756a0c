#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    auth::{AdminCredential, ADMIN_KEY_HEADER},
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    notifications::{EmailMessage, NotificationError, Notifier},
    services::{
        catalog::{CreateProductRequest, CreateVariantRequest, ProductResponse, VariantResponse},
        inventory::{self, StockTarget},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_KEY: &str = "integration-admin-key";

/// Notifier double that records every attempt and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub attempts: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        self.attempts.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(NotificationError::Rejected {
                status: 503,
                body: "provider unavailable".into(),
            });
        }
        Ok(())
    }
}

/// Full application over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_notifier(RecordingNotifier::default()).await
    }

    pub async fn with_failing_notifier() -> Self {
        Self::with_notifier(RecordingNotifier::failing()).await
    }

    async fn with_notifier(notifier: RecordingNotifier) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::sqlite_in_memory())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            ADMIN_KEY.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let notifier = Arc::new(notifier);
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            Some(Arc::new(EventSender::new(event_tx))),
            notifier.clone(),
        );

        Self {
            router: build_router(state.clone()),
            state,
            notifier,
            _event_task: event_task,
        }
    }

    pub fn admin(&self) -> AdminCredential {
        AdminCredential::new(ADMIN_KEY)
    }

    /// Sends a request, optionally carrying the admin key.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        admin_key: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = admin_key {
            builder = builder.header(ADMIN_KEY_HEADER, key);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(ADMIN_KEY)).await
    }

    pub async fn seed_product(&self, name: &str, base_price: Decimal, stock: i32) -> ProductResponse {
        self.state
            .services
            .catalog
            .create_product(
                CreateProductRequest {
                    name: name.to_string(),
                    category: "Keychains".to_string(),
                    description: None,
                    base_price,
                    stock,
                    is_customizable: true,
                    customization_fee: None,
                    image_url: None,
                    cover_image_url: None,
                    gallery_images: Vec::new(),
                },
                Some(&self.admin()),
            )
            .await
            .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        material: &str,
        shape: &str,
        price_modifier: Decimal,
        stock: i32,
    ) -> VariantResponse {
        self.state
            .services
            .catalog
            .create_variant(
                product_id,
                CreateVariantRequest {
                    material: Some(material.to_string()),
                    shape: Some(shape.to_string()),
                    price_modifier,
                    stock,
                },
                Some(&self.admin()),
            )
            .await
            .expect("seed variant")
    }

    pub async fn place_order(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Response {
        let mut payload = json!({
            "customer_name": "Asha Verma",
            "phone": "9876543210",
            "email": "asha@example.com",
            "product_id": product_id,
            "quantity": quantity,
        });
        if let Some(variant_id) = variant_id {
            payload["variant_id"] = json!(variant_id);
        }
        self.request(Method::POST, "/api/v1/orders", Some(payload), None)
            .await
    }

    /// Places an order that must succeed and returns its id.
    pub async fn place_order_ok(&self, product_id: Uuid, variant_id: Option<Uuid>, quantity: i32) -> Uuid {
        let response = self.place_order(product_id, variant_id, quantity).await;
        assert_eq!(response.status(), 201, "order placement failed");
        let body = response_json(response).await;
        body["data"]["order_id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("order id in response")
    }

    pub async fn set_status(&self, order_id: Uuid, status: &str) -> Response {
        self.request_as_admin(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": status })),
        )
        .await
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        inventory::available(&*self.state.db, StockTarget::Product(product_id))
            .await
            .expect("product stock")
    }

    pub async fn variant_stock(&self, variant_id: Uuid) -> i32 {
        inventory::available(&*self.state.db, StockTarget::Variant(variant_id))
            .await
            .expect("variant stock")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec()
}

/// Reads a decimal that may be serialized as a string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

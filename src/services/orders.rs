use crate::{
    auth::{AdminCredential, CredentialVerifier},
    db::DbPool,
    entities::{order, product, product_variant, OrderStatus},
    errors::ServiceError,
    events::{emit, Event, EventSender},
    services::inventory::{self, insufficient_stock_message, StockTarget},
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").unwrap();
}

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

/// Number of units in one order, 1 to 10 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity(i32);

impl Quantity {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 10;

    pub fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Quantity {
    type Error = ServiceError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Quantity(value))
        } else {
            Err(ServiceError::ValidationError(format!(
                "Quantity must be between {} and {}",
                Self::MIN,
                Self::MAX
            )))
        }
    }
}

/// `(unit_price, total_price)` for an order line
pub fn price_order(
    base_price: Decimal,
    price_modifier: Option<Decimal>,
    quantity: Quantity,
) -> (Decimal, Decimal) {
    let unit = base_price + price_modifier.unwrap_or(Decimal::ZERO);
    (unit, unit * Decimal::from(quantity.get()))
}

/// Public order form. Prices are never accepted from the client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    #[validate(length(max = 120), custom = "not_blank")]
    pub customer_name: String,
    #[validate(regex(path = "PHONE_RE", message = "phone number is not valid"))]
    pub phone: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(email)]
    pub email: Option<String>,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, max = 10, message = "Quantity must be between 1 and 10"))]
    pub quantity: i32,
    /// Artwork reference returned by the upload service
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_customized: bool,
}

/// Validated order placement command
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: Quantity,
    pub image_url: Option<String>,
    pub is_customized: bool,
}

impl CreateOrderRequest {
    pub fn into_command(self) -> Result<PlaceOrder, ServiceError> {
        self.validate()?;
        Ok(PlaceOrder {
            quantity: Quantity::try_from(self.quantity)?,
            customer_name: self.customer_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email,
            product_id: self.product_id,
            variant_id: self.variant_id,
            image_url: self.image_url,
            is_customized: self.is_customized,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderCreatedResponse {
    pub order_id: Uuid,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub quantity: i32,
}

/// Order joined with its product and variant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub product_category: Option<String>,
    pub variant_id: Option<Uuid>,
    pub material: Option<String>,
    pub shape: Option<String>,
    pub quantity: i32,
    pub image_url: Option<String>,
    pub payment_screenshot_url: Option<String>,
    pub is_customized: bool,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub status_label: String,
    pub invoice_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    fn build(
        order: order::Model,
        product: Option<&product::Model>,
        variant: Option<&product_variant::Model>,
    ) -> Self {
        Self {
            id: order.id,
            customer_name: order.customer_name,
            phone: order.phone,
            email: order.email,
            product_id: order.product_id,
            product_name: product.map(|p| p.name.clone()),
            product_category: product.map(|p| p.category.clone()),
            variant_id: order.variant_id,
            material: variant.and_then(|v| v.material.clone()),
            shape: variant.and_then(|v| v.shape.clone()),
            quantity: order.quantity,
            image_url: order.image_url,
            payment_screenshot_url: order.payment_screenshot_url,
            is_customized: order.is_customized,
            unit_price: order.unit_price,
            total_price: order.total_price,
            status_label: order.status.label().to_string(),
            status: order.status,
            invoice_number: order.invoice_number,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    /// 1-based page number
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// e.g. `PAYMENT_PENDING`
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PaymentScreenshotRequest {
    /// URL of the uploaded screenshot in external storage
    #[validate(url)]
    pub payment_screenshot_url: String,
}

/// Order ledger: placement, lookup and listing
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            verifier,
        }
    }

    /// Validates the public form and places the order
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderCreatedResponse, ServiceError> {
        let command = request.into_command()?;
        self.place_order(command).await
    }

    /// Places an order and reserves its stock in one transaction.
    ///
    /// The stock check before the transaction only produces a friendly error;
    /// the conditional decrement inside it is what guarantees stock never
    /// goes negative.
    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = command.quantity.get()))]
    pub async fn place_order(
        &self,
        command: PlaceOrder,
    ) -> Result<OrderCreatedResponse, ServiceError> {
        let db = &*self.db_pool;

        let product = product::Entity::find_by_id(command.product_id)
            .one(db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", command.product_id)))?;

        let variant = match command.variant_id {
            Some(variant_id) => Some(
                product_variant::Entity::find_by_id(variant_id)
                    .filter(product_variant::Column::ProductId.eq(product.id))
                    .one(db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Variant {}", variant_id)))?,
            ),
            None => {
                let has_variants = product_variant::Entity::find()
                    .filter(product_variant::Column::ProductId.eq(product.id))
                    .count(db)
                    .await?
                    > 0;
                if has_variants {
                    return Err(ServiceError::ValidationError(
                        "variant required".to_string(),
                    ));
                }
                None
            }
        };

        let quantity = command.quantity.get();
        let effective_stock = variant.as_ref().map(|v| v.stock).unwrap_or(product.stock);
        if effective_stock < quantity {
            return Err(ServiceError::InsufficientStock(insufficient_stock_message(
                effective_stock,
                quantity,
            )));
        }

        let (unit_price, total_price) = price_order(
            product.base_price,
            variant.as_ref().map(|v| v.price_modifier),
            command.quantity,
        );

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            customer_name: Set(command.customer_name),
            phone: Set(command.phone),
            email: Set(command.email),
            product_id: Set(product.id),
            variant_id: Set(variant.as_ref().map(|v| v.id)),
            quantity: Set(quantity),
            image_url: Set(command.image_url),
            payment_screenshot_url: Set(None),
            is_customized: Set(command.is_customized),
            unit_price: Set(unit_price),
            total_price: Set(total_price),
            status: Set(OrderStatus::PaymentPending),
            invoice_number: Set(None),
            invoiced_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        let target = StockTarget::for_order(product.id, order_model.variant_id);
        if let Err(e) = inventory::reserve(&txn, target, quantity).await {
            if let Err(rollback_err) = txn.rollback().await {
                error!(error = %rollback_err, "Failed to roll back order creation");
            }
            warn!(error = %e, order_id = %order_id, "Stock reservation failed, order discarded");
            return Err(e);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, total_price = %total_price, "Order created successfully");
        metrics::counter!("storefront.orders.created", 1);

        emit(
            self.event_sender.as_deref(),
            Event::OrderCreated {
                order_id,
                product_id: product.id,
                variant_id: order_model.variant_id,
                quantity,
                total_price,
            },
        )
        .await;

        Ok(OrderCreatedResponse {
            order_id,
            unit_price,
            total_price,
            status: order_model.status,
            product_name: product.name,
            variant_label: variant.as_ref().and_then(|v| v.label()),
            quantity,
        })
    }

    /// Public tracking view of one order
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))?;

        let mut views = self.join_catalog(vec![order]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("order vanished during join".to_string()))
    }

    /// Admin listing, newest first
    #[instrument(skip(self, credential))]
    pub async fn list_orders(
        &self,
        credential: Option<&AdminCredential>,
        query: ListOrdersQuery,
    ) -> Result<OrderListResponse, ServiceError> {
        self.verifier.authorize(credential)?;

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut select = order::Entity::find();
        if let Some(raw) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
            let status = OrderStatus::from_str(raw.trim())
                .map_err(|_| ServiceError::ValidationError(format!("Unknown status {}", raw)))?;
            select = select.filter(order::Column::Status.eq(status));
        }

        let paginator = select
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderListResponse {
            orders: self.join_catalog(orders).await?,
            total,
            page,
            per_page,
        })
    }

    /// Attaches the externally stored payment screenshot to a pending order
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn record_payment_screenshot(
        &self,
        order_id: Uuid,
        request: PaymentScreenshotRequest,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;

        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentScreenshotUrl,
                Expr::value(request.payment_screenshot_url),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::PaymentPending))
            .exec(&*self.db_pool)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish a missing order from one that is past payment.
            let view = self.get_order(order_id).await?;
            return Err(ServiceError::Conflict(format!(
                "Order is {}, payment screenshots are only accepted while payment is pending",
                view.status
            )));
        }

        info!("Payment screenshot recorded");
        emit(
            self.event_sender.as_deref(),
            Event::PaymentScreenshotRecorded(order_id),
        )
        .await;

        self.get_order(order_id).await
    }

    async fn join_catalog(&self, orders: Vec<order::Model>) -> Result<Vec<OrderView>, ServiceError> {
        let db = &*self.db_pool;

        let product_ids: Vec<Uuid> = orders.iter().map(|o| o.product_id).collect();
        let variant_ids: Vec<Uuid> = orders.iter().filter_map(|o| o.variant_id).collect();

        let products: HashMap<Uuid, product::Model> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };
        let variants: HashMap<Uuid, product_variant::Model> = if variant_ids.is_empty() {
            HashMap::new()
        } else {
            product_variant::Entity::find()
                .filter(product_variant::Column::Id.is_in(variant_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|v| (v.id, v))
                .collect()
        };

        Ok(orders
            .into_iter()
            .map(|o| {
                let product = products.get(&o.product_id);
                let variant = o.variant_id.and_then(|id| variants.get(&id));
                OrderView::build(o, product, variant)
            })
            .collect())
    }
}

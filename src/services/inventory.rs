use crate::{
    auth::{AdminCredential, CredentialVerifier},
    db::DbPool,
    entities::{product, product_variant},
    errors::ServiceError,
    events::{emit, Event, EventSender},
};
use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// The counter an order draws from: its variant, or the product when it has none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockTarget {
    Product(Uuid),
    Variant(Uuid),
}

impl StockTarget {
    pub fn for_order(product_id: Uuid, variant_id: Option<Uuid>) -> Self {
        match variant_id {
            Some(variant_id) => StockTarget::Variant(variant_id),
            None => StockTarget::Product(product_id),
        }
    }
}

/// Message for an order of `requested` units against `available`.
pub fn insufficient_stock_message(available: i32, requested: i32) -> String {
    if available <= 0 {
        "Out of stock".to_string()
    } else {
        format!(
            "Insufficient stock. Available: {}, Requested: {}",
            available, requested
        )
    }
}

/// Current stock of `target`, or `NotFound`.
pub async fn available<C: ConnectionTrait>(conn: &C, target: StockTarget) -> Result<i32, ServiceError> {
    let stock = match target {
        StockTarget::Product(id) => product::Entity::find_by_id(id)
            .one(conn)
            .await?
            .map(|p| p.stock),
        StockTarget::Variant(id) => product_variant::Entity::find_by_id(id)
            .one(conn)
            .await?
            .map(|v| v.stock),
    };
    stock.ok_or_else(|| ServiceError::NotFound(format!("Stock record for {:?}", target)))
}

/// Atomically takes `quantity` units from `target`.
///
/// Runs `UPDATE ... SET stock = stock - q WHERE id = ? AND stock >= q`; when no
/// row matches, nothing is changed and `InsufficientStock` is returned.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    target: StockTarget,
    quantity: i32,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let result = match target {
        StockTarget::Product(id) => {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(id))
                .filter(product::Column::Stock.gte(quantity))
                .exec(conn)
                .await?
        }
        StockTarget::Variant(id) => {
            product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).sub(quantity),
                )
                .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                .filter(product_variant::Column::Id.eq(id))
                .filter(product_variant::Column::Stock.gte(quantity))
                .exec(conn)
                .await?
        }
    };

    if result.rows_affected == 0 {
        let current = available(conn, target).await?;
        warn!(?target, quantity, current, "conditional stock decrement matched no row");
        return Err(ServiceError::InsufficientStock(insufficient_stock_message(
            current, quantity,
        )));
    }
    Ok(())
}

/// Returns `quantity` units to `target`.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    target: StockTarget,
    quantity: i32,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let result = match target {
        StockTarget::Product(id) => {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
        StockTarget::Variant(id) => {
            product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).add(quantity),
                )
                .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                .filter(product_variant::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
    };

    if result.rows_affected == 0 {
        // The stock record was removed after the order was placed.
        warn!(?target, quantity, "stock release matched no row");
    }
    Ok(())
}

/// Overwrites the stock counter of `target` with an absolute value.
pub async fn set_stock<C: ConnectionTrait>(
    conn: &C,
    target: StockTarget,
    stock: i32,
) -> Result<(), ServiceError> {
    if stock < 0 {
        return Err(ServiceError::ValidationError(
            "stock must not be negative".to_string(),
        ));
    }
    let now = Utc::now();
    let result = match target {
        StockTarget::Product(id) => {
            product::Entity::update_many()
                .col_expr(product::Column::Stock, Expr::value(stock))
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
        StockTarget::Variant(id) => {
            product_variant::Entity::update_many()
                .col_expr(product_variant::Column::Stock, Expr::value(stock))
                .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                .filter(product_variant::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
    };

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(match target {
            StockTarget::Product(id) => format!("Product {}", id),
            StockTarget::Variant(id) => format!("Variant {}", id),
        }));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SetStockRequest {
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VariantStockResponse {
    pub variant_id: Uuid,
    pub stock: i32,
}

/// Admin-facing stock operations
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl InventoryService {
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

    /// Sets a variant's stock to an absolute value
    #[instrument(skip(self, credential, request), fields(variant_id = %variant_id))]
    pub async fn set_variant_stock(
        &self,
        variant_id: Uuid,
        request: SetStockRequest,
        credential: Option<&AdminCredential>,
    ) -> Result<VariantStockResponse, ServiceError> {
        self.verifier.authorize(credential)?;
        request.validate()?;

        set_stock(&*self.db_pool, StockTarget::Variant(variant_id), request.stock)
            .await
            .map_err(|e| {
                if matches!(e, ServiceError::DatabaseError(_)) {
                    error!(error = %e, "Failed to set variant stock");
                }
                e
            })?;

        info!(stock = request.stock, "Variant stock set");
        emit(
            self.event_sender.as_deref(),
            Event::VariantStockSet {
                variant_id,
                stock: request.stock,
            },
        )
        .await;

        Ok(VariantStockResponse {
            variant_id,
            stock: request.stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_messages_match_storefront_copy() {
        assert_eq!(insufficient_stock_message(0, 2), "Out of stock");
        assert_eq!(
            insufficient_stock_message(3, 5),
            "Insufficient stock. Available: 3, Requested: 5"
        );
    }

    #[test]
    fn order_target_prefers_variant() {
        let product_id = Uuid::new_v4();
        let variant_id = Uuid::new_v4();
        assert_eq!(
            StockTarget::for_order(product_id, Some(variant_id)),
            StockTarget::Variant(variant_id)
        );
        assert_eq!(
            StockTarget::for_order(product_id, None),
            StockTarget::Product(product_id)
        );
    }

    #[tokio::test]
    async fn reserving_unknown_stock_is_not_found() {
        let db = crate::db::establish_connection_with_config(&crate::db::DbConfig::sqlite_in_memory())
            .await
            .unwrap();
        crate::db::run_migrations(&db).await.unwrap();

        let result = reserve(&db, StockTarget::Product(Uuid::new_v4()), 1).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}

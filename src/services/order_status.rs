use crate::{
    auth::{AdminCredential, CredentialVerifier},
    db::DbPool,
    entities::{order, OrderStatus},
    errors::ServiceError,
    events::{emit, Event, EventSender},
    notifications::NotificationDispatcher,
    services::{
        inventory::{self, StockTarget},
        invoicing::allocate_invoice_number,
    },
};
use chrono::{DateTime, Datelike, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrderStatusRequest {
    /// Target status, e.g. `PAYMENT_RECEIVED`
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusTransitionResponse {
    pub order_id: Uuid,
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
    pub invoice_number: Option<String>,
}

/// Parses a wire status name such as `IN_PROGRESS`.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status '{}'", raw)))
}

/// Drives orders through their lifecycle.
///
/// The status change, invoice issuance and stock release commit together;
/// the customer email is sent afterwards and cannot undo the change.
#[derive(Clone)]
pub struct OrderStatusService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    verifier: Arc<dyn CredentialVerifier>,
    notifications: NotificationDispatcher,
}

impl OrderStatusService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        verifier: Arc<dyn CredentialVerifier>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            verifier,
            notifications,
        }
    }

    #[instrument(skip(self, credential), fields(order_id = %order_id))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: &str,
        credential: Option<&AdminCredential>,
    ) -> Result<StatusTransitionResponse, ServiceError> {
        self.verifier.authorize(credential)?;
        let next = parse_status(new_status)?;
        let db = &*self.db_pool;

        let current = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))?;

        if current.status == next {
            info!(status = %next, "Order already in requested status");
            return Ok(StatusTransitionResponse {
                order_id,
                previous_status: current.status,
                status: next,
                invoice_number: current.invoice_number,
            });
        }

        if !current.status.can_transition_to(next) {
            if current.status.is_terminal() {
                warn!(from = %current.status, to = %next, "Order is closed; status change refused");
            } else {
                warn!(from = %current.status, to = %next, "Rejected invalid status transition");
            }
            return Err(ServiceError::InvalidTransition {
                from: current.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for status change");
            ServiceError::DatabaseError(e)
        })?;

        let issued = match apply_transition(&txn, &current, next, now).await {
            Ok(issued) => issued,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Failed to roll back status change");
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit status change");
            ServiceError::DatabaseError(e)
        })?;

        let previous = current.status;
        info!(from = %previous, to = %next, "Order status changed");
        metrics::counter!("storefront.orders.status_changed", 1);

        emit(
            self.event_sender.as_deref(),
            Event::OrderStatusChanged {
                order_id,
                old_status: previous,
                new_status: next,
            },
        )
        .await;
        if let Some(invoice_number) = &issued {
            metrics::counter!("storefront.invoices.issued", 1);
            emit(
                self.event_sender.as_deref(),
                Event::InvoiceIssued {
                    order_id,
                    invoice_number: invoice_number.clone(),
                },
            )
            .await;
        }
        if next == OrderStatus::Rejected {
            emit(
                self.event_sender.as_deref(),
                Event::StockReleased {
                    order_id,
                    quantity: current.quantity,
                },
            )
            .await;
        }

        let mut updated = current;
        updated.status = next;
        updated.updated_at = now;
        if issued.is_some() {
            updated.invoice_number = issued;
            updated.invoiced_at = Some(now);
        }
        self.notifications.notify_status_change(&updated, next).await;

        Ok(StatusTransitionResponse {
            order_id,
            previous_status: previous,
            status: next,
            invoice_number: updated.invoice_number,
        })
    }
}

/// Applies a validated transition inside `conn`. Returns a newly issued invoice number.
async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    current: &order::Model,
    next: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Option<String>, ServiceError> {
    let result = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(next))
        .col_expr(order::Column::UpdatedAt, Expr::value(now))
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Status.eq(current.status))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(
            "Order status was changed by another request".to_string(),
        ));
    }

    match (current.status, next) {
        (OrderStatus::PaymentPending, OrderStatus::PaymentReceived)
            if current.invoice_number.is_none() =>
        {
            let invoice_number = allocate_invoice_number(conn, now.year()).await?;
            order::Entity::update_many()
                .col_expr(
                    order::Column::InvoiceNumber,
                    Expr::value(invoice_number.clone()),
                )
                .col_expr(order::Column::InvoicedAt, Expr::value(now))
                .filter(order::Column::Id.eq(current.id))
                .exec(conn)
                .await?;
            Ok(Some(invoice_number))
        }
        (OrderStatus::PaymentPending, OrderStatus::Rejected) => {
            inventory::release(
                conn,
                StockTarget::for_order(current.product_id, current.variant_id),
                current.quantity,
            )
            .await?;
            Ok(None)
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_wire_names() {
        assert_eq!(
            parse_status("PAYMENT_RECEIVED").unwrap(),
            OrderStatus::PaymentReceived
        );
        assert_eq!(parse_status(" COMPLETED ").unwrap(), OrderStatus::Completed);
        assert_matches!(
            parse_status("shipped"),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            parse_status("payment_received"),
            Err(ServiceError::ValidationError(_))
        );
    }
}

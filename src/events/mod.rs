use crate::entities::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Sends `event` if a sender is configured, logging instead of failing.
pub async fn emit(sender: Option<&EventSender>, event: Event) {
    if let Some(sender) = sender {
        if let Err(e) = sender.send(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }
}

// Domain events produced after a transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
        total_price: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    InvoiceIssued {
        order_id: Uuid,
        invoice_number: String,
    },
    StockReleased {
        order_id: Uuid,
        quantity: i32,
    },
    PaymentScreenshotRecorded(Uuid),
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeactivated(Uuid),
    VariantCreated { product_id: Uuid, variant_id: Uuid },
    VariantStockSet { variant_id: Uuid, stock: i32 },
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                quantity,
                total_price,
                ..
            } => {
                info!(%order_id, quantity, %total_price, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, from = %old_status, to = %new_status, "order status changed");
            }
            Event::InvoiceIssued {
                order_id,
                invoice_number,
            } => {
                info!(%order_id, invoice_number = %invoice_number, "invoice issued");
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers_to_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();

        emit(Some(&sender), Event::ProductCreated(id)).await;
        emit(None, Event::ProductCreated(Uuid::new_v4())).await;

        assert_eq!(rx.recv().await, Some(Event::ProductCreated(id)));
    }

    #[tokio::test]
    async fn emit_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        emit(Some(&sender), Event::ProductDeactivated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn processor_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        tx.send(Event::PaymentScreenshotRecorded(Uuid::new_v4()))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}

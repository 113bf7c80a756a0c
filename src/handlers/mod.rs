pub mod admin;
pub mod common;
pub mod orders;
pub mod products;

use crate::{
    auth::CredentialVerifier,
    db::DbPool,
    events::EventSender,
    notifications::NotificationDispatcher,
    services::{
        catalog::CatalogService, inventory::InventoryService, invoicing::InvoiceService,
        order_status::OrderStatusService, orders::OrderService,
    },
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub use crate::AppState;

/// Services layer used by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub invoices: Arc<InvoiceService>,
}

/// Storefront identity and pricing defaults shared by several services
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub store_name: String,
    pub store_domain: String,
    pub default_customization_fee: Decimal,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        verifier: Arc<dyn CredentialVerifier>,
        notifications: NotificationDispatcher,
        store: StoreSettings,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(
                db_pool.clone(),
                event_sender.clone(),
                verifier.clone(),
                store.default_customization_fee,
            )),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                event_sender.clone(),
                verifier.clone(),
            )),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                verifier.clone(),
            )),
            order_status: Arc::new(OrderStatusService::new(
                db_pool.clone(),
                event_sender,
                verifier,
                notifications,
            )),
            invoices: Arc::new(InvoiceService::new(
                db_pool,
                store.store_name,
                store.store_domain,
            )),
        }
    }
}

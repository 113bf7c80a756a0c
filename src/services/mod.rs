pub mod catalog;
pub mod inventory;
pub mod invoicing;
pub mod order_status;
pub mod orders;

pub mod invoice_sequence;
pub mod order;
pub mod product;
pub mod product_variant;

pub use order::OrderStatus;

//! Shared identifiers and value types for the checkout services.

pub mod line_item;
pub mod stock;
pub mod types;

pub use line_item::{CartOrderRequest, LineItem, Money};
pub use stock::{ProductStock, StockQuery};
pub use types::{CartLineId, OrderId, ProductId, UserId};

/// Header carrying the verified caller id, set by the gateway and forwarded
/// on service-to-service calls made on the caller's behalf.
pub const USER_ID_HEADER: &str = "x-user-id";

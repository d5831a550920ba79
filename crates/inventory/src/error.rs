//! Product-service error types.

use common::CartLineId;
use discovery::DiscoveryError;
use event_bus::BusError;
use thiserror::Error;

/// Errors raised by cart and product storage, and by the updater loop.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Quantity out of range: {0}")]
    InvalidQuantity(u32),

    /// A stored row holds a value the model cannot represent.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Errors raised by the cross-service call to the order service.
#[derive(Debug, Error)]
pub enum OrderCheckoutError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("orders responded with status {0}")]
    Status(u16),

    #[error("orders request failed: {0}")]
    Transport(String),

    #[error("orders returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the cart aggregator.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cart line not found: {0}")]
    NotFound(CartLineId),

    #[error(transparent)]
    Store(#[from] InventoryError),

    #[error("Order checkout failed: {0}")]
    Checkout(#[from] OrderCheckoutError),
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

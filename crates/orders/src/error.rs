//! Order-service error types.

use common::{OrderId, ProductId};
use discovery::DiscoveryError;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by order persistence.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value the model cannot represent.
    #[error("Corrupt order row: {0}")]
    Corrupt(String),
}

/// Errors raised by peer-service clients (users, products).
#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("{service} responded with status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} request failed: {reason}")]
    Transport {
        service: &'static str,
        reason: String,
    },
}

/// Errors raised by the payment provider client.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

/// Checkout failures, one variant per failure category.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Line items were empty or a quantity was zero.
    #[error("Invalid checkout request: {0}")]
    Validation(String),

    /// A required peer service has no healthy instance or the registry is down.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Billing identity unresolved")]
    BillingIdentityUnresolved,

    #[error("Product unavailable or out of stock: {0}")]
    ProductUnavailable(ProductId),

    #[error("Payment session creation failed")]
    PaymentSession(#[source] PaymentError),

    /// The payment session exists but the pending order was not written.
    #[error("Order persistence failed for {order_id}")]
    OrderPersistence {
        order_id: OrderId,
        session_id: String,
        /// Whether the dangling session was expired at the provider.
        session_expired: bool,
        #[source]
        source: OrderError,
    },
}

impl CheckoutError {
    /// Short label used as the `reason` metric tag.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation",
            CheckoutError::ServiceUnavailable(_) => "service_unavailable",
            CheckoutError::BillingIdentityUnresolved => "billing_identity",
            CheckoutError::ProductUnavailable(_) => "product_unavailable",
            CheckoutError::PaymentSession(_) => "payment_session",
            CheckoutError::OrderPersistence { .. } => "order_persistence",
        }
    }
}

/// Webhook failures that must be reported to the provider as non-2xx.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Malformed event payload: {0}")]
    Malformed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Missing metadata field: {0}")]
    MissingMetadata(&'static str),

    #[error("Event carries neither product_id nor products metadata")]
    MissingProductInfo,

    /// The paid status was not recorded; the provider should retry.
    #[error("Order update failed: {0}")]
    Persistence(#[source] OrderError),
}

pub type Result<T> = std::result::Result<T, OrderError>;

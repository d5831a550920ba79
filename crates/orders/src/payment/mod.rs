//! Payment-provider client.

mod memory;
mod stripe;

pub use memory::InMemoryPaymentGateway;
pub use stripe::{StripeConfig, StripeGateway};

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::Money;

use crate::error::PaymentError;

/// One priced line of a payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub price_id: String,
    pub quantity: u32,
}

/// Request to open a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Sent as the provider idempotency key so a retried request cannot
    /// open a second session.
    pub idempotency_key: String,
    /// Provider customer id (the caller's billing identity).
    pub customer: String,
    pub line_items: Vec<SessionLineItem>,
    /// Copied onto the resulting payment so the webhook can read it back.
    pub metadata: BTreeMap<String, String>,
}

/// An opened checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    /// Redirect URL for the customer.
    pub url: String,
    /// Total computed by the provider.
    pub amount_total: Money,
}

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, PaymentError>;

    /// Expires an open session so it can no longer be paid.
    async fn expire_session(&self, session_id: &str) -> Result<(), PaymentError>;
}

//! Order-service core.
//!
//! - [`CheckoutOrchestrator`] turns an authenticated checkout into a payment
//!   session and a pending order.
//! - [`PaymentWebhookHandler`] settles orders from payment notifications and
//!   publishes one `OrderPaidEvent` per line.
//! - [`OrderRepository`] persists orders, in memory or in PostgreSQL.

pub mod checkout;
pub mod error;
pub mod metadata;
pub mod order;
pub mod payment;
pub mod peers;
pub mod repository;
pub mod webhook;

pub use checkout::{
    CheckoutConfig, CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest, JoinStrategy,
};
pub use error::{CheckoutError, OrderError, PaymentError, PeerError, Result, WebhookError};
pub use metadata::{OrderLines, PaymentMetadata};
pub use order::{Order, OrderStatus};
pub use payment::{
    InMemoryPaymentGateway, PaymentGateway, PaymentSession, SessionLineItem, SessionRequest,
    StripeConfig, StripeGateway,
};
pub use peers::{
    HttpProductCatalog, HttpUserDirectory, ProductCatalog, StaticProductCatalog,
    StaticUserDirectory, UserDirectory,
};
pub use repository::{InMemoryOrderRepository, OrderRepository, PostgresOrderRepository};
pub use webhook::{
    MAX_WEBHOOK_BODY, PAYMENT_SUCCEEDED, PaymentWebhookHandler, SignatureVerifier, WebhookOutcome,
};

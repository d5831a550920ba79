//! Order persistence.

mod memory;
mod postgres;

pub use memory::InMemoryOrderRepository;
pub use postgres::PostgresOrderRepository;

use async_trait::async_trait;
use common::OrderId;

use crate::error::Result;
use crate::order::Order;

/// Storage for orders.
///
/// Each operation is its own single-statement transaction; there is no
/// business transaction spanning a whole checkout.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order. Fails with `AlreadyExists` on a duplicate id.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Moves a pending order to paid and records the provider transaction id.
    ///
    /// Repeating the call for an order already paid with the same
    /// transaction id succeeds without changes, so provider retries are safe.
    async fn mark_paid(&self, id: OrderId, transaction_id: &str) -> Result<Order>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
}

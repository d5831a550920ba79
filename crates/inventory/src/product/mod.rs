//! Product stock and price references.

mod memory;
mod postgres;

pub use memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;

use async_trait::async_trait;
use common::{ProductId, ProductStock};
use event_bus::OrderPaidEvent;

use crate::error::Result;

/// Whether applied `(order_id, product_id)` pairs are recorded and skipped
/// on redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Each pair decrements stock at most once.
    #[default]
    Enabled,
    /// Every delivery decrements stock, so a redelivered event is applied twice.
    Disabled,
}

impl DedupPolicy {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            DedupPolicy::Enabled
        } else {
            DedupPolicy::Disabled
        }
    }
}

/// What applying one `OrderPaidEvent` did to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Stock was decremented; `remaining` is the new level.
    Applied { remaining: i64 },
    /// Stock was already zero, nothing changed.
    StockExhausted,
    /// The pair was already applied.
    Duplicate,
    /// No such product.
    UnknownProduct,
}

impl DecrementOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecrementOutcome::Applied { .. } => "applied",
            DecrementOutcome::StockExhausted => "exhausted",
            DecrementOutcome::Duplicate => "duplicate",
            DecrementOutcome::UnknownProduct => "unknown_product",
        }
    }
}

/// Stock storage for the product service.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Stock of every known product in `ids`, in request order. Unknown ids
    /// are left out.
    async fn stock(&self, ids: &[ProductId]) -> Result<Vec<ProductStock>>;

    async fn product_stock(&self, id: &ProductId) -> Result<Option<ProductStock>>;

    /// Decrements stock by the event's quantity, guarded by `stock > 0` and
    /// floored at zero, as one transaction.
    async fn apply_order_paid(
        &self,
        event: &OrderPaidEvent,
        dedup: DedupPolicy,
    ) -> Result<DecrementOutcome>;
}

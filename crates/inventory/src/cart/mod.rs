//! Shopping carts.
//!
//! A user has at most one `inprogress` cart: the set of their `inprogress`
//! rows, all sharing one provisional order id. Checkout flips those rows to
//! `pending` and hands the line items to the order service; the rows become
//! `completed` once the order's payment event is applied.

mod aggregator;
mod memory;
mod postgres;

pub use aggregator::{CartAggregator, CartCheckout};
pub use memory::InMemoryCartRepository;
pub use postgres::PostgresCartRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartLineId, LineItem, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle of a cart row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    /// Still being assembled by the user.
    InProgress,
    /// Handed to the order service for checkout.
    Pending,
    /// The order was paid and inventory applied.
    Completed,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::InProgress => "inprogress",
            CartStatus::Pending => "pending",
            CartStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inprogress" => Some(CartStatus::InProgress),
            "pending" => Some(CartStatus::Pending),
            "completed" => Some(CartStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (user, product) row of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub quantity: u32,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The rows of one cart, read together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub order_id: OrderId,
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// Groups rows that share an order id. Returns `None` for no rows.
    pub(crate) fn from_lines(lines: Vec<CartLine>) -> Option<Self> {
        let order_id = lines.first()?.order_id;
        Some(Self { order_id, lines })
    }

    pub fn line_items(&self) -> Vec<LineItem> {
        self.lines
            .iter()
            .map(|l| LineItem::new(l.product_id.clone(), l.quantity))
            .collect()
    }
}

/// Storage for cart rows.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Adds `quantity` of `product_id` to the user's in-progress cart.
    ///
    /// Opens a new cart with a fresh provisional order id when the user has
    /// none; increments the existing row when the product is already in it.
    async fn add_or_increment(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// The user's in-progress cart, if any.
    async fn in_progress(&self, user_id: &UserId) -> Result<Option<CartSnapshot>>;

    /// Atomically moves every in-progress row of the user to `pending` and
    /// returns them. Rows added afterwards open a new cart.
    async fn begin_checkout(&self, user_id: &UserId) -> Result<Option<CartSnapshot>>;

    /// Moves the order's pending rows to `completed`; returns the row count.
    async fn complete_order(&self, order_id: OrderId) -> Result<u64>;

    /// Deletes one of the user's rows while it is still in progress.
    /// Returns `false` when nothing matched.
    async fn remove_in_progress(&self, user_id: &UserId, line_id: CartLineId) -> Result<bool>;
}

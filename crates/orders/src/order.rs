//! Order model and status machine.

use chrono::{DateTime, Utc};
use common::{LineItem, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// Transitions only move forward:
/// ```text
/// Pending ──┬──► Paid
///           └──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Payment session created, payment not yet confirmed.
    #[default]
    Pending,
    /// Provider confirmed payment.
    Paid,
    Canceled,
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid) | (OrderStatus::Pending, OrderStatus::Canceled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One checkout attempt.
///
/// Created as `Pending` only after a payment session exists for it, and
/// moved to `Paid` by the payment webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<LineItem>,
    pub status: OrderStatus,
    /// Provider's payment id, set when the order is paid.
    pub stripe_transaction_id: Option<String>,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order.
    pub fn pending(id: OrderId, user_id: UserId, lines: Vec<LineItem>, total_price: Money) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            lines,
            status: OrderStatus::Pending,
            stripe_transaction_id: None,
            total_price,
            created_at: now,
            updated_at: now,
        }
    }
}

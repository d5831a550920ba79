use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// Topic carrying [`OrderPaidEvent`]s, named `<service>.<event>`.
pub const TOPIC_ORDER_PAID: &str = "order-service.order-paid";

/// Consumer group the product service subscribes with.
pub const PRODUCT_SERVICE_GROUP: &str = "product-service";

/// Emitted once per product line when an order's payment succeeds.
///
/// The publisher does not persist it; durability is the broker's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl OrderPaidEvent {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        }
    }

    /// Message key: the order id, so all lines of one order share a partition.
    pub fn key(&self) -> String {
        self.order_id.to_string()
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

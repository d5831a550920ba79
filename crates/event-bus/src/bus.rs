use std::time::Duration;

use async_trait::async_trait;

use crate::event::{OrderPaidEvent, TOPIC_ORDER_PAID};
use crate::Result;

/// A record handed to a subscriber.
///
/// Delivery is at-least-once: the same `(topic, partition, offset)` may be
/// seen again until it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

impl BusRecord {
    pub fn decode_order_paid(&self) -> Result<OrderPaidEvent> {
        Ok(OrderPaidEvent::from_payload(&self.payload)?)
    }
}

/// Producer side of the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Writes `payload` under `key` and waits for the broker acknowledgment.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;

    /// Publishes an [`OrderPaidEvent`] keyed by its order id.
    async fn publish_order_paid(&self, event: &OrderPaidEvent) -> Result<()> {
        let payload = event.to_payload()?;
        self.publish(TOPIC_ORDER_PAID, &event.key(), payload).await
    }
}

/// Consumer-group member of the bus.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Waits up to `timeout` for records, returning at most `max` of them.
    /// An empty batch means the wait elapsed.
    async fn poll(&self, max: usize, timeout: Duration) -> Result<Vec<BusRecord>>;

    /// Marks `record` (and everything before it on its partition) as consumed.
    async fn commit(&self, record: &BusRecord) -> Result<()>;
}

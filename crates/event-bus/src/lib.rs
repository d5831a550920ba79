//! Event bus for the checkout services.
//!
//! The only cross-service message is [`OrderPaidEvent`], published by the
//! order service's webhook and consumed by the product service's inventory
//! updater. Delivery is at-least-once: subscribers commit after handling and
//! may see a record again if they stop before committing.

pub mod bus;
pub mod error;
pub mod event;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

pub use bus::{BusRecord, EventPublisher, EventSubscriber};
pub use error::{BusError, Result};
pub use event::{OrderPaidEvent, PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaPublisher, KafkaSubscriber};
pub use memory::{InMemoryEventBus, InMemorySubscriber};

//! Product-service core.
//!
//! - [`CartAggregator`] assembles per-user carts and hands them to the order
//!   service's checkout.
//! - [`ProductStore`] answers stock lookups and applies paid orders to stock.
//! - [`InventoryUpdater`] consumes `OrderPaidEvent`s and drives the store.

pub mod cart;
pub mod checkout_client;
pub mod error;
pub mod product;
pub mod updater;

pub use cart::{
    CartAggregator, CartCheckout, CartLine, CartRepository, CartSnapshot, CartStatus,
    InMemoryCartRepository, PostgresCartRepository,
};
pub use checkout_client::{
    CheckoutSession, HttpOrderCheckout, ORDERS_SERVICE, OrderCheckout, RecordedCheckout,
    RecordingOrderCheckout,
};
pub use error::{CartError, InventoryError, OrderCheckoutError, Result};
pub use product::{
    DecrementOutcome, DedupPolicy, InMemoryProductStore, PostgresProductStore, ProductStore,
};
pub use updater::{InventoryUpdater, RecordOutcome, UpdaterConfig};

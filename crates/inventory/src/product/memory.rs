use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, ProductStock};
use event_bus::OrderPaidEvent;
use tokio::sync::RwLock;

use super::{DecrementOutcome, DedupPolicy, ProductStore};
use crate::error::{InventoryError, Result};

#[derive(Debug, Default)]
struct ProductState {
    products: HashMap<ProductId, ProductStock>,
    processed: HashSet<(OrderId, ProductId)>,
    fail_on_update: bool,
}

/// In-memory product store for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<RwLock<ProductState>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a product.
    pub async fn upsert(&self, id: impl Into<ProductId>, stock: i64, price_id: &str) {
        let product_id = id.into();
        self.state.write().await.products.insert(
            product_id.clone(),
            ProductStock {
                product_id,
                stock,
                price_id: price_id.to_string(),
            },
        );
    }

    pub async fn stock_of(&self, id: &str) -> Option<i64> {
        self.state
            .read()
            .await
            .products
            .get(&ProductId::new(id))
            .map(|p| p.stock)
    }

    /// Makes `apply_order_paid` fail with a database error.
    pub async fn set_fail_on_update(&self, fail: bool) {
        self.state.write().await.fail_on_update = fail;
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn stock(&self, ids: &[ProductId]) -> Result<Vec<ProductStock>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn product_stock(&self, id: &ProductId) -> Result<Option<ProductStock>> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn apply_order_paid(
        &self,
        event: &OrderPaidEvent,
        dedup: DedupPolicy,
    ) -> Result<DecrementOutcome> {
        let mut state = self.state.write().await;
        if state.fail_on_update {
            return Err(InventoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let key = (event.order_id, event.product_id.clone());
        if dedup == DedupPolicy::Enabled && state.processed.contains(&key) {
            return Ok(DecrementOutcome::Duplicate);
        }

        let outcome = match state.products.get_mut(&event.product_id) {
            None => DecrementOutcome::UnknownProduct,
            Some(p) if p.stock <= 0 => DecrementOutcome::StockExhausted,
            Some(p) => {
                p.stock = (p.stock - i64::from(event.quantity)).max(0);
                DecrementOutcome::Applied {
                    remaining: p.stock,
                }
            }
        };
        if dedup == DedupPolicy::Enabled {
            state.processed.insert(key);
        }
        Ok(outcome)
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, ProductStock};
use tokio::sync::RwLock;

use super::{ProductCatalog, UserDirectory};
use crate::error::PeerError;

/// How a fake peer answers.
#[derive(Debug, Clone, Copy, Default)]
enum Latency {
    #[default]
    Immediate,
    Delayed(Duration),
    /// Never answers.
    Hang,
}

impl Latency {
    async fn wait(self) {
        match self {
            Latency::Immediate => {}
            Latency::Delayed(d) => tokio::time::sleep(d).await,
            Latency::Hang => std::future::pending::<()>().await,
        }
    }
}

/// User directory answering from a fixed identity.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    identity: Arc<RwLock<Option<String>>>,
    latency: Arc<RwLock<Latency>>,
    fail_status: Arc<RwLock<Option<u16>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticUserDirectory {
    pub fn with_identity(identity: &str) -> Self {
        Self {
            identity: Arc::new(RwLock::new(Some(identity.to_string()))),
            ..Self::default()
        }
    }

    /// A directory where the caller has no billing identity.
    pub fn without_identity() -> Self {
        Self::default()
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.latency.write().await = Latency::Delayed(delay);
    }

    /// Makes every call hang forever.
    pub async fn set_unresponsive(&self) {
        *self.latency.write().await = Latency::Hang;
    }

    /// Makes calls answer with a non-success status.
    pub async fn set_fail_status(&self, status: Option<u16>) {
        *self.fail_status.write().await = status;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn billing_identity(&self, _bearer: &str) -> Result<Option<String>, PeerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read().await;
        latency.wait().await;

        if let Some(status) = *self.fail_status.read().await {
            return Err(PeerError::Status {
                service: super::USERS_SERVICE,
                status,
            });
        }
        Ok(self.identity.read().await.clone())
    }
}

/// Product catalog answering from an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductStock>>>,
    latency: Arc<RwLock<Latency>>,
    calls: Arc<AtomicUsize>,
    last_query: Arc<RwLock<Vec<ProductId>>>,
}

impl StaticProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product_id: &str, stock: i64, price_id: &str) {
        let product_id = ProductId::new(product_id);
        self.products.write().await.insert(
            product_id.clone(),
            ProductStock {
                product_id,
                stock,
                price_id: price_id.to_string(),
            },
        );
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.latency.write().await = Latency::Delayed(delay);
    }

    pub async fn set_unresponsive(&self) {
        *self.latency.write().await = Latency::Hang;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids requested by the most recent call.
    pub async fn last_query(&self) -> Vec<ProductId> {
        self.last_query.read().await.clone()
    }
}

#[async_trait]
impl ProductCatalog for StaticProductCatalog {
    async fn stock(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>, PeerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.write().await = product_ids.to_vec();
        let latency = *self.latency.read().await;
        latency.wait().await;

        let products = self.products.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| products.get(id).cloned())
            .collect())
    }
}

use async_trait::async_trait;
use common::{ProductId, ProductStock, StockQuery};
use discovery::ServiceLocator;
use reqwest::Client;
use serde::Deserialize;

use super::{PRODUCTS_SERVICE, ProductCatalog, USERS_SERVICE, UserDirectory};
use crate::error::PeerError;

#[derive(Deserialize)]
struct BillingIdentityResponse {
    #[serde(default)]
    stripe_customer_id: String,
}

/// User-service client, resolved through the locator on every call.
#[derive(Clone)]
pub struct HttpUserDirectory {
    locator: ServiceLocator,
    client: Client,
}

impl HttpUserDirectory {
    pub fn new(locator: ServiceLocator, client: Client) -> Self {
        Self { locator, client }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    #[tracing::instrument(skip_all, fields(service = USERS_SERVICE))]
    async fn billing_identity(&self, bearer: &str) -> Result<Option<String>, PeerError> {
        let instance = self.locator.resolve(USERS_SERVICE).await?;
        let url = format!("{}/users/stripe", instance.base_url());

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .send()
            .await
            .map_err(|e| transport(USERS_SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                service: USERS_SERVICE,
                status: status.as_u16(),
            });
        }

        let body: BillingIdentityResponse = response
            .json()
            .await
            .map_err(|e| transport(USERS_SERVICE, e))?;
        tracing::debug!(instance = %instance, "Fetched billing identity");

        Ok(Some(body.stripe_customer_id).filter(|id| !id.is_empty()))
    }
}

/// Product-service client for batched stock lookups.
#[derive(Clone)]
pub struct HttpProductCatalog {
    locator: ServiceLocator,
    client: Client,
}

impl HttpProductCatalog {
    pub fn new(locator: ServiceLocator, client: Client) -> Self {
        Self { locator, client }
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[tracing::instrument(skip_all, fields(service = PRODUCTS_SERVICE, count = product_ids.len()))]
    async fn stock(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>, PeerError> {
        let instance = self.locator.resolve(PRODUCTS_SERVICE).await?;
        let url = format!("{}/products/stock", instance.base_url());

        let response = self
            .client
            .post(&url)
            .json(&StockQuery::new(product_ids.to_vec()))
            .send()
            .await
            .map_err(|e| transport(PRODUCTS_SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                service: PRODUCTS_SERVICE,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| transport(PRODUCTS_SERVICE, e))
    }
}

fn transport(service: &'static str, e: reqwest::Error) -> PeerError {
    PeerError::Transport {
        service,
        reason: e.to_string(),
    }
}

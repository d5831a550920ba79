//! Cross-service call from the cart to the order service's checkout.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{CartOrderRequest, OrderId, USER_ID_HEADER, UserId};
use discovery::ServiceLocator;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::OrderCheckoutError;

/// Logical name of the order service in the registry.
pub const ORDERS_SERVICE: &str = "orders";

/// Payment session handed back by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    /// Redirect URL of the hosted payment page.
    #[serde(rename = "checkout_session_id")]
    pub url: String,
}

/// Starts a multi-line checkout on the order service.
#[async_trait]
pub trait OrderCheckout: Send + Sync {
    /// `bearer` is the caller's `Authorization` header, forwarded verbatim
    /// alongside `user_id`.
    async fn cart_checkout(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        bearer: &str,
        request: &CartOrderRequest,
    ) -> Result<CheckoutSession, OrderCheckoutError>;
}

/// `POST /orders/cartcheckout/{order_id}` on an instance picked by the locator.
#[derive(Clone)]
pub struct HttpOrderCheckout {
    locator: ServiceLocator,
    client: Client,
    timeout: Duration,
}

impl HttpOrderCheckout {
    pub fn new(locator: ServiceLocator, client: Client, timeout: Duration) -> Self {
        Self {
            locator,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl OrderCheckout for HttpOrderCheckout {
    #[tracing::instrument(skip_all, fields(service = ORDERS_SERVICE, %order_id))]
    async fn cart_checkout(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        bearer: &str,
        request: &CartOrderRequest,
    ) -> Result<CheckoutSession, OrderCheckoutError> {
        let instance = self.locator.resolve(ORDERS_SERVICE).await?;
        let url = format!("{}/orders/cartcheckout/{}", instance.base_url(), order_id);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .header(USER_ID_HEADER, user_id.as_str())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| OrderCheckoutError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrderCheckoutError::Status(status.as_u16()));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| OrderCheckoutError::InvalidResponse(e.to_string()))?;
        if session.url.is_empty() {
            return Err(OrderCheckoutError::InvalidResponse(
                "empty checkout session".to_string(),
            ));
        }
        Ok(session)
    }
}

/// One call seen by [`RecordingOrderCheckout`].
#[derive(Debug, Clone)]
pub struct RecordedCheckout {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub bearer: String,
    pub request: CartOrderRequest,
}

#[derive(Debug, Default)]
struct RecordedCheckouts {
    requests: Vec<RecordedCheckout>,
    fail_status: Option<u16>,
}

/// Order-service double that records calls and answers with a fixed URL.
#[derive(Debug, Clone, Default)]
pub struct RecordingOrderCheckout {
    state: Arc<RwLock<RecordedCheckouts>>,
    calls: Arc<AtomicUsize>,
}

impl RecordingOrderCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the order service answered `status`.
    pub async fn set_fail_status(&self, status: Option<u16>) {
        self.state.write().await.fail_status = status;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every call, oldest first.
    pub async fn requests(&self) -> Vec<RecordedCheckout> {
        self.state.read().await.requests.clone()
    }
}

#[async_trait]
impl OrderCheckout for RecordingOrderCheckout {
    async fn cart_checkout(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        bearer: &str,
        request: &CartOrderRequest,
    ) -> Result<CheckoutSession, OrderCheckoutError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.requests.push(RecordedCheckout {
            order_id,
            user_id: user_id.clone(),
            bearer: bearer.to_string(),
            request: request.clone(),
        });
        if let Some(status) = state.fail_status {
            return Err(OrderCheckoutError::Status(status));
        }
        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{order_id}"),
        })
    }
}

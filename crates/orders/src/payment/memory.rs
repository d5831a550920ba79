use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::Money;
use tokio::sync::RwLock;

use super::{PaymentGateway, PaymentSession, SessionRequest};
use crate::error::PaymentError;

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    prices: HashMap<String, Money>,
    /// Sessions by idempotency key.
    sessions: HashMap<String, (PaymentSession, SessionRequest)>,
    expired: Vec<String>,
    create_calls: usize,
    fail_on_create: bool,
    fail_on_expire: bool,
}

/// In-memory payment provider for testing.
///
/// Totals are computed from a registered price table. Repeating a request
/// with the same idempotency key returns the original session.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, price_id: &str, unit: Money) {
        self.state
            .write()
            .await
            .prices
            .insert(price_id.to_string(), unit);
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    pub async fn set_fail_on_expire(&self, fail: bool) {
        self.state.write().await.fail_on_expire = fail;
    }

    /// Number of `create_session` calls, including failed ones.
    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_expired(&self, session_id: &str) -> bool {
        self.state.read().await.expired.iter().any(|id| id == session_id)
    }

    /// The request a session was opened with, looked up by idempotency key.
    pub async fn request_for(&self, idempotency_key: &str) -> Option<SessionRequest> {
        self.state
            .read()
            .await
            .sessions
            .get(idempotency_key)
            .map(|(_, request)| request.clone())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, PaymentError> {
        let mut state = self.state.write().await;
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(PaymentError::Rejected {
                status: 402,
                message: "card_declined".to_string(),
            });
        }
        if let Some((session, _)) = state.sessions.get(&request.idempotency_key) {
            return Ok(session.clone());
        }

        let mut total = Money::zero();
        for item in &request.line_items {
            let unit = state.prices.get(&item.price_id).copied().ok_or_else(|| {
                PaymentError::Rejected {
                    status: 400,
                    message: format!("No such price: '{}'", item.price_id),
                }
            })?;
            total = total + unit.multiply(item.quantity);
        }

        let id = format!("cs_test_{:04}", state.sessions.len() + 1);
        let session = PaymentSession {
            url: format!("https://checkout.example.com/pay/{id}"),
            id,
            amount_total: total,
        };
        state.sessions.insert(
            request.idempotency_key.clone(),
            (session.clone(), request.clone()),
        );
        Ok(session)
    }

    async fn expire_session(&self, session_id: &str) -> Result<(), PaymentError> {
        let mut state = self.state.write().await;
        if state.fail_on_expire {
            return Err(PaymentError::Transport("connection reset".to_string()));
        }
        state.expired.push(session_id.to_string());
        Ok(())
    }
}

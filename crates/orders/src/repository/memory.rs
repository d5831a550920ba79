use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use tokio::sync::RwLock;

use super::OrderRepository;
use crate::error::{OrderError, Result};
use crate::order::{Order, OrderStatus};

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, Order>,
    fail_on_create: bool,
    fail_on_update: bool,
}

/// In-memory order repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create` fail with a database error.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes `mark_paid` fail with a database error.
    pub async fn set_fail_on_update(&self, fail: bool) {
        self.state.write().await.fail_on_update = fail;
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn all(&self) -> Vec<Order> {
        self.state.read().await.orders.values().cloned().collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(OrderError::Database(sqlx::Error::PoolTimedOut));
        }
        if state.orders.contains_key(&order.id) {
            return Err(OrderError::AlreadyExists(order.id));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn mark_paid(&self, id: OrderId, transaction_id: &str) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.fail_on_update {
            return Err(OrderError::Database(sqlx::Error::PoolTimedOut));
        }
        let order = state.orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;

        if order.status == OrderStatus::Paid
            && order.stripe_transaction_id.as_deref() == Some(transaction_id)
        {
            return Ok(order.clone());
        }
        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Err(OrderError::InvalidTransition {
                order_id: id,
                from: order.status,
                to: OrderStatus::Paid,
            });
        }

        order.status = OrderStatus::Paid;
        order.stripe_transaction_id = Some(transaction_id.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{LineItem, Money, UserId};

    fn order() -> Order {
        Order::pending(
            OrderId::new(),
            UserId::new("u1"),
            vec![LineItem::new("P1", 2)],
            Money::from_minor(5000),
        )
    }

    #[tokio::test]
    async fn create_and_get() {
        let repo = InMemoryOrderRepository::new();
        let order = order();

        repo.create(&order).await.unwrap();

        assert_eq!(repo.get(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.create(&order).await.unwrap();

        let result = repo.create(&order).await;

        assert!(matches!(result, Err(OrderError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn mark_paid_records_transaction() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.create(&order).await.unwrap();

        let paid = repo.mark_paid(order.id, "pi_123").await.unwrap();

        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.stripe_transaction_id.as_deref(), Some("pi_123"));
        assert!(paid.updated_at >= paid.created_at);
    }

    #[tokio::test]
    async fn mark_paid_is_idempotent_for_same_transaction() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.create(&order).await.unwrap();
        repo.mark_paid(order.id, "pi_123").await.unwrap();

        assert!(repo.mark_paid(order.id, "pi_123").await.is_ok());
        assert!(matches!(
            repo.mark_paid(order.id, "pi_other").await,
            Err(OrderError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn mark_paid_unknown_order() {
        let repo = InMemoryOrderRepository::new();
        let result = repo.mark_paid(OrderId::new(), "pi_1").await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn fail_on_create_writes_nothing() {
        let repo = InMemoryOrderRepository::new();
        repo.set_fail_on_create(true).await;

        assert!(repo.create(&order()).await.is_err());
        assert_eq!(repo.count().await, 0);
    }
}

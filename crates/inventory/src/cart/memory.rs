use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartLineId, OrderId, ProductId, UserId};
use tokio::sync::RwLock;

use super::{CartLine, CartRepository, CartSnapshot, CartStatus};
use crate::error::{InventoryError, Result};

#[derive(Debug, Default)]
struct CartState {
    lines: Vec<CartLine>,
    fail_on_write: bool,
}

/// In-memory cart repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartRepository {
    state: Arc<RwLock<CartState>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every mutating call fail with a database error.
    pub async fn set_fail_on_write(&self, fail: bool) {
        self.state.write().await.fail_on_write = fail;
    }

    /// Every row ever stored, regardless of status.
    pub async fn all(&self) -> Vec<CartLine> {
        self.state.read().await.lines.clone()
    }
}

impl CartState {
    fn check_writable(&self) -> Result<()> {
        if self.fail_on_write {
            return Err(InventoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn in_progress(&self, user_id: &UserId) -> impl Iterator<Item = &CartLine> {
        self.lines
            .iter()
            .filter(move |l| &l.user_id == user_id && l.status == CartStatus::InProgress)
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn add_or_increment(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let mut state = self.state.write().await;
        state.check_writable()?;
        let now = Utc::now();

        if let Some(line) = state.lines.iter_mut().find(|l| {
            &l.user_id == user_id && &l.product_id == product_id && l.status == CartStatus::InProgress
        }) {
            line.quantity = line
                .quantity
                .checked_add(quantity)
                .ok_or(InventoryError::InvalidQuantity(quantity))?;
            line.updated_at = now;
            return Ok(line.clone());
        }

        let order_id = state
            .in_progress(user_id)
            .next()
            .map(|l| l.order_id)
            .unwrap_or_default();
        let line = CartLine {
            id: CartLineId::new(),
            product_id: product_id.clone(),
            user_id: user_id.clone(),
            order_id,
            quantity,
            status: CartStatus::InProgress,
            created_at: now,
            updated_at: now,
        };
        state.lines.push(line.clone());
        Ok(line)
    }

    async fn in_progress(&self, user_id: &UserId) -> Result<Option<CartSnapshot>> {
        let state = self.state.read().await;
        Ok(CartSnapshot::from_lines(
            state.in_progress(user_id).cloned().collect(),
        ))
    }

    async fn begin_checkout(&self, user_id: &UserId) -> Result<Option<CartSnapshot>> {
        let mut state = self.state.write().await;
        state.check_writable()?;
        let now = Utc::now();

        let mut flipped = Vec::new();
        for line in state.lines.iter_mut() {
            if &line.user_id == user_id && line.status == CartStatus::InProgress {
                line.status = CartStatus::Pending;
                line.updated_at = now;
                flipped.push(line.clone());
            }
        }
        Ok(CartSnapshot::from_lines(flipped))
    }

    async fn complete_order(&self, order_id: OrderId) -> Result<u64> {
        let mut state = self.state.write().await;
        state.check_writable()?;
        let now = Utc::now();

        let mut count = 0;
        for line in state.lines.iter_mut() {
            if line.order_id == order_id && line.status == CartStatus::Pending {
                line.status = CartStatus::Completed;
                line.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn remove_in_progress(&self, user_id: &UserId, line_id: CartLineId) -> Result<bool> {
        let mut state = self.state.write().await;
        state.check_writable()?;

        let before = state.lines.len();
        state.lines.retain(|l| {
            !(l.id == line_id && &l.user_id == user_id && l.status == CartStatus::InProgress)
        });
        Ok(state.lines.len() < before)
    }
}

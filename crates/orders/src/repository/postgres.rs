use async_trait::async_trait;
use common::{LineItem, Money, OrderId, UserId};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::OrderRepository;
use crate::error::{OrderError, Result};
use crate::order::{Order, OrderStatus};

const ORDER_COLUMNS: &str =
    "id, user_id, lines, status, stripe_transaction_id, total_price, created_at, updated_at";

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| OrderError::Corrupt(format!("unknown status '{status}'")))?;
        let Json(lines): Json<Vec<LineItem>> = row.try_get("lines")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            lines,
            status,
            stripe_transaction_id: row.try_get("stripe_transaction_id")?,
            total_price: Money::from_minor(row.try_get("total_price")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, lines, status, stripe_transaction_id, total_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_str())
        .bind(Json(&order.lines))
        .bind(order.status.as_str())
        .bind(order.stripe_transaction_id.as_deref())
        .bind(order.total_price.minor_units())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return OrderError::AlreadyExists(order.id);
            }
            OrderError::Database(e)
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn mark_paid(&self, id: OrderId, transaction_id: &str) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = 'paid', stripe_transaction_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let order = match updated {
            Some(row) => Self::row_to_order(row)?,
            None => {
                let current = sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(OrderError::NotFound(id))?;
                let current = Self::row_to_order(current)?;

                if current.status != OrderStatus::Paid
                    || current.stripe_transaction_id.as_deref() != Some(transaction_id)
                {
                    return Err(OrderError::InvalidTransition {
                        order_id: id,
                        from: current.status,
                        to: OrderStatus::Paid,
                    });
                }
                current
            }
        };

        tx.commit().await?;
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }
}

use async_trait::async_trait;
use common::{ProductId, ProductStock};
use event_bus::OrderPaidEvent;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{DecrementOutcome, DedupPolicy, ProductStore};
use crate::error::{InventoryError, Result};

/// PostgreSQL-backed product store.
#[derive(Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_stock(row: PgRow) -> Result<ProductStock> {
        let stock: i32 = row.try_get("stock")?;
        Ok(ProductStock {
            product_id: ProductId::new(row.try_get::<String, _>("id")?),
            stock: i64::from(stock),
            price_id: row.try_get("price_id")?,
        })
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn stock(&self, ids: &[ProductId]) -> Result<Vec<ProductStock>> {
        let keys: Vec<&str> = ids.iter().map(ProductId::as_str).collect();
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.stock, p.price_id
            FROM UNNEST($1::text[]) WITH ORDINALITY AS q(id, ord)
            JOIN products p ON p.id = q.id
            ORDER BY q.ord
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_stock).collect()
    }

    async fn product_stock(&self, id: &ProductId) -> Result<Option<ProductStock>> {
        let row = sqlx::query("SELECT id, stock, price_id FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_stock).transpose()
    }

    #[tracing::instrument(
        skip(self, event),
        fields(order_id = %event.order_id, product_id = %event.product_id, quantity = event.quantity)
    )]
    async fn apply_order_paid(
        &self,
        event: &OrderPaidEvent,
        dedup: DedupPolicy,
    ) -> Result<DecrementOutcome> {
        let quantity =
            i32::try_from(event.quantity).map_err(|_| InventoryError::InvalidQuantity(event.quantity))?;
        let mut tx = self.pool.begin().await?;

        if dedup == DedupPolicy::Enabled {
            let recorded = sqlx::query(
                r#"
                INSERT INTO processed_order_events (order_id, product_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (order_id, product_id) DO NOTHING
                "#,
            )
            .bind(event.order_id.as_uuid())
            .bind(event.product_id.as_str())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            if recorded.rows_affected() == 0 {
                return Ok(DecrementOutcome::Duplicate);
            }
        }

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = GREATEST(stock - $1, 0), updated_at = NOW()
            WHERE id = $2 AND stock > 0
            RETURNING stock
            "#,
        )
        .bind(quantity)
        .bind(event.product_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match remaining {
            Some(stock) => DecrementOutcome::Applied {
                remaining: i64::from(stock),
            },
            None => {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT 1 FROM products WHERE id = $1")
                        .bind(event.product_id.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;
                if exists.is_some() {
                    DecrementOutcome::StockExhausted
                } else {
                    DecrementOutcome::UnknownProduct
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

use async_trait::async_trait;
use common::{CartLineId, OrderId, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{CartLine, CartRepository, CartSnapshot, CartStatus};
use crate::error::{InventoryError, Result};

const CART_COLUMNS: &str =
    "id, product_id, user_id, order_id, quantity, status, created_at, updated_at";

/// PostgreSQL-backed cart repository.
#[derive(Clone)]
pub struct PostgresCartRepository {
    pool: PgPool,
}

impl PostgresCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_line(row: PgRow) -> Result<CartLine> {
        let status: String = row.try_get("status")?;
        let status = CartStatus::parse(&status)
            .ok_or_else(|| InventoryError::Corrupt(format!("unknown cart status '{status}'")))?;
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| InventoryError::Corrupt(format!("negative cart quantity {quantity}")))?;

        Ok(CartLine {
            id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            quantity,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn rows_to_snapshot(rows: Vec<PgRow>) -> Result<Option<CartSnapshot>> {
        let lines = rows
            .into_iter()
            .map(Self::row_to_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(CartSnapshot::from_lines(lines))
    }
}

fn db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| InventoryError::InvalidQuantity(quantity))
}

/// Postgres reports an `INTEGER` overflow as SQLSTATE 22003.
fn out_of_range_as_invalid(e: sqlx::Error, quantity: u32) -> InventoryError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("22003") => {
            InventoryError::InvalidQuantity(quantity)
        }
        _ => InventoryError::Database(e),
    }
}

#[async_trait]
impl CartRepository for PostgresCartRepository {
    #[tracing::instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    async fn add_or_increment(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let requested = quantity;
        let quantity = db_quantity(quantity)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT order_id FROM cart
            WHERE user_id = $1 AND status = 'inprogress'
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let row = match existing {
            Some(order_id) => {
                let updated = sqlx::query(&format!(
                    r#"
                    UPDATE cart
                    SET quantity = quantity + $1, updated_at = NOW()
                    WHERE user_id = $2 AND product_id = $3 AND status = 'inprogress'
                    RETURNING {CART_COLUMNS}
                    "#
                ))
                .bind(quantity)
                .bind(user_id.as_str())
                .bind(product_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| out_of_range_as_invalid(e, requested))?;

                match updated {
                    Some(row) => row,
                    None => insert_line(&mut tx, user_id, product_id, order_id, quantity).await?,
                }
            }
            None => {
                insert_line(&mut tx, user_id, product_id, Uuid::new_v4(), quantity).await?
            }
        };

        tx.commit().await?;
        Self::row_to_line(row)
    }

    async fn in_progress(&self, user_id: &UserId) -> Result<Option<CartSnapshot>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CART_COLUMNS} FROM cart
            WHERE user_id = $1 AND status = 'inprogress'
            ORDER BY created_at
            "#
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_snapshot(rows)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn begin_checkout(&self, user_id: &UserId) -> Result<Option<CartSnapshot>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE cart
            SET status = 'pending', updated_at = NOW()
            WHERE user_id = $1 AND status = 'inprogress'
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_snapshot(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_order(&self, order_id: OrderId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cart
            SET status = 'completed', updated_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn remove_in_progress(&self, user_id: &UserId, line_id: CartLineId) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM cart WHERE id = $1 AND user_id = $2 AND status = 'inprogress'",
        )
        .bind(line_id.as_uuid())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn insert_line(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &UserId,
    product_id: &ProductId,
    order_id: Uuid,
    quantity: i32,
) -> Result<PgRow> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO cart (id, product_id, user_id, order_id, quantity, status)
        VALUES ($1, $2, $3, $4, $5, 'inprogress')
        RETURNING {CART_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(product_id.as_str())
    .bind(user_id.as_str())
    .bind(order_id)
    .bind(quantity)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

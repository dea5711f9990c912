use async_trait::async_trait;
use domain::{Order, OrderStatus};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{OrderRepository, Result, StoreError};

/// PostgreSQL-backed order repository.
///
/// The order document lives in `data`; `order_status` is kept in its own
/// column so status changes are plain conditional updates.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let mut order: Order = serde_json::from_value(row.try_get("data")?)?;
        let status: String = row.try_get("order_status")?;
        order.order_status = status.parse()?;
        Ok(order)
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create_if_not_exist(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (order_number, transaction_id, order_status, order_date, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_number) DO NOTHING
            "#,
        )
        .bind(&order.order_number)
        .bind(order.transaction_id.as_uuid())
        .bind(order.order_status.as_str())
        .bind(order.order_date)
        .bind(serde_json::to_value(order)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Order> {
        let row = sqlx::query("SELECT order_status, data FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", order_number))?;

        Self::row_to_order(row)
    }

    async fn change_status(
        &self,
        order_number: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<Order>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query(
            r#"
            UPDATE orders SET order_status = $3
            WHERE order_number = $1 AND order_status = ANY($2)
            RETURNING order_status, data
            "#,
        )
        .bind(order_number)
        .bind(from)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_order(row).map(Some),
            // Distinguish a status mismatch from a missing order.
            None => self.find_by_order_number(order_number).await.map(|_| None),
        }
    }
}

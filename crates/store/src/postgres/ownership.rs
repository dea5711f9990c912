use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::OwnershipInfo;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{OwnershipInfoRepository, Result};

#[derive(Clone)]
pub struct PostgresOwnershipInfoRepository {
    pool: PgPool,
}

impl PostgresOwnershipInfoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_info(row: PgRow) -> Result<OwnershipInfo> {
        let mut info: OwnershipInfo = serde_json::from_value(row.try_get("data")?)?;
        info.owned_through = row.try_get("owned_through")?;
        Ok(info)
    }
}

#[async_trait]
impl OwnershipInfoRepository for PostgresOwnershipInfoRepository {
    async fn save_by_identifier(&self, info: &OwnershipInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ownership_infos (identifier, order_number, owned_from, owned_through, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identifier) DO UPDATE
            SET order_number = EXCLUDED.order_number,
                owned_from = EXCLUDED.owned_from,
                owned_through = EXCLUDED.owned_through,
                data = EXCLUDED.data
            "#,
        )
        .bind(&info.identifier)
        .bind(&info.order_number)
        .bind(info.owned_from)
        .bind(info.owned_through)
        .bind(serde_json::to_value(info)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Vec<OwnershipInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT owned_through, data FROM ownership_infos
            WHERE order_number = $1
            ORDER BY identifier ASC
            "#,
        )
        .bind(order_number)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_info).collect()
    }

    async fn invalidate_by_order_number(
        &self,
        order_number: &str,
        owned_through: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ownership_infos SET owned_through = $2
            WHERE order_number = $1 AND (owned_through IS NULL OR owned_through > $2)
            "#,
        )
        .bind(order_number)
        .bind(owned_through)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

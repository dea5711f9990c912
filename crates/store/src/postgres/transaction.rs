use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use domain::{
    PotentialActions, TasksExportationStatus, Transaction, TransactionAttributes,
    TransactionObject, TransactionResult, TransactionStatus, TransactionType,
};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{map_insert_error, to_db_limit};
use crate::transaction::validate_confirmation;
use crate::{Result, StoreError, TransactionRepository, TransactionSearch};

const COLUMNS: &str = "id, type_of, status, agent, object, result, potential_actions, \
     start_date, end_date, expires, tasks_exportation_status, tasks_exported_at, updated_at";

/// PostgreSQL-backed transaction repository.
///
/// `object`, `result` and `potential_actions` hold the saga-specific payload
/// only; the `type_of` column decides how they are decoded.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_transaction(row: PgRow) -> Result<Transaction> {
        let type_of: TransactionType = row.try_get::<String, _>("type_of")?.parse()?;
        let status: String = row.try_get("status")?;
        let exportation: String = row.try_get("tasks_exportation_status")?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status: status.parse()?,
            agent: serde_json::from_value(row.try_get("agent")?)?,
            object: decode_object(type_of, row.try_get("object")?)?,
            result: row
                .try_get::<Option<Value>, _>("result")?
                .map(|value| decode_result(type_of, value))
                .transpose()?,
            potential_actions: row
                .try_get::<Option<Value>, _>("potential_actions")?
                .map(|value| decode_potential_actions(type_of, value))
                .transpose()?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            expires: row.try_get("expires")?,
            tasks_exportation_status: exportation.parse()?,
            tasks_exported_at: row.try_get("tasks_exported_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Runs a conditional update that returns the changed row, if any.
    async fn update_returning(
        &self,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<Transaction>> {
        query
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_transaction)
            .transpose()
    }
}

fn decode_object(type_of: TransactionType, value: Value) -> Result<TransactionObject> {
    Ok(match type_of {
        TransactionType::PlaceOrder => TransactionObject::PlaceOrder(serde_json::from_value(value)?),
        TransactionType::ReturnOrder => {
            TransactionObject::ReturnOrder(serde_json::from_value(value)?)
        }
    })
}

fn encode_object(object: &TransactionObject) -> Result<Value> {
    Ok(match object {
        TransactionObject::PlaceOrder(object) => serde_json::to_value(object)?,
        TransactionObject::ReturnOrder(object) => serde_json::to_value(object)?,
    })
}

fn decode_result(type_of: TransactionType, value: Value) -> Result<TransactionResult> {
    Ok(match type_of {
        TransactionType::PlaceOrder => TransactionResult::PlaceOrder(serde_json::from_value(value)?),
        TransactionType::ReturnOrder => {
            TransactionResult::ReturnOrder(serde_json::from_value(value)?)
        }
    })
}

fn encode_result(result: &TransactionResult) -> Result<Value> {
    Ok(match result {
        TransactionResult::PlaceOrder(result) => serde_json::to_value(result)?,
        TransactionResult::ReturnOrder(result) => serde_json::to_value(result)?,
    })
}

fn decode_potential_actions(type_of: TransactionType, value: Value) -> Result<PotentialActions> {
    Ok(match type_of {
        TransactionType::PlaceOrder => PotentialActions::PlaceOrder(serde_json::from_value(value)?),
        TransactionType::ReturnOrder => {
            PotentialActions::ReturnOrder(serde_json::from_value(value)?)
        }
    })
}

fn encode_potential_actions(actions: &PotentialActions) -> Result<Value> {
    Ok(match actions {
        PotentialActions::PlaceOrder(actions) => serde_json::to_value(actions)?,
        PotentialActions::ReturnOrder(actions) => serde_json::to_value(actions)?,
    })
}

fn in_progress_not_found(type_of: TransactionType, id: TransactionId) -> StoreError {
    StoreError::not_found("Transaction", format!("InProgress {type_of} {id}"))
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn start(&self, attributes: TransactionAttributes) -> Result<Transaction> {
        let transaction = Transaction::start(attributes, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, type_of, status, agent, object, start_date, expires,
                 tasks_exportation_status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.type_of().as_str())
        .bind(transaction.status.as_str())
        .bind(serde_json::to_value(&transaction.agent)?)
        .bind(encode_object(&transaction.object)?)
        .bind(transaction.start_date)
        .bind(transaction.expires)
        .bind(transaction.tasks_exportation_status.as_str())
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error("Transaction", e))?;

        Ok(transaction)
    }

    async fn find_by_id(
        &self,
        type_of: TransactionType,
        id: TransactionId,
    ) -> Result<Transaction> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1 AND type_of = $2"
        ))
        .bind(id.as_uuid())
        .bind(type_of.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Transaction", format!("{type_of} {id}")))?;

        Self::row_to_transaction(row)
    }

    async fn find_in_progress_by_id(
        &self,
        type_of: TransactionType,
        id: TransactionId,
    ) -> Result<Transaction> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1 AND type_of = $2 AND status = $3"
        ))
        .bind(id.as_uuid())
        .bind(type_of.as_str())
        .bind(TransactionStatus::InProgress.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| in_progress_not_found(type_of, id))?;

        Self::row_to_transaction(row)
    }

    async fn update_object(
        &self,
        id: TransactionId,
        object: TransactionObject,
    ) -> Result<Transaction> {
        let type_of = object.type_of();
        let sql = format!(
            "UPDATE transactions SET object = $4 \
             WHERE id = $1 AND type_of = $2 AND status = $3 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(type_of.as_str())
            .bind(TransactionStatus::InProgress.as_str())
            .bind(encode_object(&object)?);

        self.update_returning(query)
            .await?
            .ok_or_else(|| in_progress_not_found(type_of, id))
    }

    async fn confirm(
        &self,
        type_of: TransactionType,
        id: TransactionId,
        result: TransactionResult,
        potential_actions: PotentialActions,
    ) -> Result<Transaction> {
        validate_confirmation(type_of, &result, &potential_actions)?;

        let sql = format!(
            "UPDATE transactions \
             SET status = $4, result = $5, potential_actions = $6, end_date = $7, updated_at = $7 \
             WHERE id = $1 AND type_of = $2 AND status = $3 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(type_of.as_str())
            .bind(TransactionStatus::InProgress.as_str())
            .bind(TransactionStatus::Confirmed.as_str())
            .bind(encode_result(&result)?)
            .bind(encode_potential_actions(&potential_actions)?)
            .bind(Utc::now());

        self.update_returning(query)
            .await?
            .ok_or_else(|| in_progress_not_found(type_of, id))
    }

    async fn cancel(&self, type_of: TransactionType, id: TransactionId) -> Result<Transaction> {
        let sql = format!(
            "UPDATE transactions SET status = $4, end_date = $5, updated_at = $5 \
             WHERE id = $1 AND type_of = $2 AND status = $3 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(type_of.as_str())
            .bind(TransactionStatus::InProgress.as_str())
            .bind(TransactionStatus::Canceled.as_str())
            .bind(Utc::now());

        self.update_returning(query)
            .await?
            .ok_or_else(|| in_progress_not_found(type_of, id))
    }

    async fn make_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET status = $2, end_date = $3, updated_at = $3
            WHERE status = $1 AND expires < $3
            "#,
        )
        .bind(TransactionStatus::InProgress.as_str())
        .bind(TransactionStatus::Expired.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::debug!(expired, "overdue transactions expired");
        }
        Ok(expired)
    }

    async fn start_export_tasks(
        &self,
        type_of: TransactionType,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>> {
        let sql = format!(
            "UPDATE transactions SET tasks_exportation_status = $4, updated_at = $5 \
             WHERE id = ( \
                 SELECT id FROM transactions \
                 WHERE type_of = $1 AND status = $2 AND tasks_exportation_status = $3 \
                 ORDER BY updated_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql)
            .bind(type_of.as_str())
            .bind(status.as_str())
            .bind(TasksExportationStatus::Unexported.as_str())
            .bind(TasksExportationStatus::Exporting.as_str())
            .bind(Utc::now());

        let claimed = self.update_returning(query).await?;
        if let Some(transaction) = &claimed {
            tracing::debug!(transaction_id = %transaction.id, %type_of, %status, "task export claimed");
        }
        Ok(claimed)
    }

    async fn set_tasks_exported_by_id(&self, id: TransactionId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET tasks_exportation_status = $3, tasks_exported_at = $4, updated_at = $4
            WHERE id = $1 AND tasks_exportation_status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(TasksExportationStatus::Exporting.as_str())
        .bind(TasksExportationStatus::Exported.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Transaction", format!("Exporting {id}")));
        }
        Ok(())
    }

    async fn reexport_tasks(&self, updated_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET tasks_exportation_status = $2, updated_at = $4
            WHERE tasks_exportation_status = $1 AND updated_at < $3
            "#,
        )
        .bind(TasksExportationStatus::Exporting.as_str())
        .bind(TasksExportationStatus::Unexported.as_str())
        .bind(updated_before)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            tracing::warn!(reset, "stuck task exports returned to Unexported");
        }
        Ok(reset)
    }

    async fn search(&self, conditions: TransactionSearch) -> Result<Vec<Transaction>> {
        let mut sql = format!("SELECT {COLUMNS} FROM transactions WHERE 1=1");
        let mut param_idx = 0;

        if conditions.type_of.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" AND type_of = ${param_idx}"));
        }
        if conditions.statuses.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" AND status = ANY(${param_idx})"));
        }
        if conditions.tasks_exportation_status.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" AND tasks_exportation_status = ${param_idx}"));
        }
        sql.push_str(" ORDER BY start_date ASC");
        if conditions.limit.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" LIMIT ${param_idx}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(type_of) = conditions.type_of {
            query = query.bind(type_of.as_str());
        }
        if let Some(statuses) = &conditions.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            query = query.bind(statuses);
        }
        if let Some(status) = conditions.tasks_exportation_status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = conditions.limit {
            query = query.bind(to_db_limit(limit));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_transaction).collect()
    }
}

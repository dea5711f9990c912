use async_trait::async_trait;
use chrono::Utc;
use common::{ActionId, TransactionId};
use domain::{Action, ActionAttributes, ActionStatus, ActionType};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::map_insert_error;
use crate::{ActionRepository, Result, StoreError};

const COLUMNS: &str =
    "id, type_of, agent, object, purpose, action_status, result, error, start_date, end_date";

/// PostgreSQL-backed action ledger.
///
/// The order number and the purpose transaction are copied into their own
/// indexed columns at insert so lookups do not scan JSON.
#[derive(Clone)]
pub struct PostgresActionRepository {
    pool: PgPool,
}

impl PostgresActionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_action(row: PgRow) -> Result<Action> {
        let type_of: String = row.try_get("type_of")?;
        let status: String = row.try_get("action_status")?;

        Ok(Action {
            id: ActionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            type_of: type_of.parse()?,
            agent: serde_json::from_value(row.try_get("agent")?)?,
            object: row.try_get("object")?,
            purpose: row
                .try_get::<Option<Value>, _>("purpose")?
                .map(serde_json::from_value)
                .transpose()?,
            action_status: status.parse()?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
        })
    }

    async fn close(
        &self,
        type_of: ActionType,
        id: ActionId,
        status: ActionStatus,
        outcome: Value,
    ) -> Result<Action> {
        let outcome_column = match status {
            ActionStatus::CompletedActionStatus => "result",
            _ => "error",
        };
        let sql = format!(
            "UPDATE actions SET action_status = $4, {outcome_column} = $5, end_date = $6 \
             WHERE id = $1 AND type_of = $2 AND action_status = $3 RETURNING {COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(type_of.as_str())
            .bind(ActionStatus::ActiveActionStatus.as_str())
            .bind(status.as_str())
            .bind(outcome)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("Action", format!("Active {type_of} {id}")))?;

        Self::row_to_action(row)
    }
}

#[async_trait]
impl ActionRepository for PostgresActionRepository {
    async fn start(&self, attributes: ActionAttributes) -> Result<Action> {
        let action = Action::start(attributes, Utc::now());
        let purpose = action
            .purpose
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO actions
                (id, type_of, agent, object, purpose, action_status, start_date,
                 order_number, purpose_transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(action.id.as_uuid())
        .bind(action.type_of.as_str())
        .bind(serde_json::to_value(&action.agent)?)
        .bind(&action.object)
        .bind(purpose)
        .bind(action.action_status.as_str())
        .bind(action.start_date)
        .bind(action.order_number())
        .bind(action.purpose_transaction_id().map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error("Action", e))?;

        Ok(action)
    }

    async fn complete(&self, type_of: ActionType, id: ActionId, result: Value) -> Result<Action> {
        self.close(type_of, id, ActionStatus::CompletedActionStatus, result)
            .await
    }

    async fn give_up(&self, type_of: ActionType, id: ActionId, error: Value) -> Result<Action> {
        self.close(type_of, id, ActionStatus::FailedActionStatus, error)
            .await
    }

    async fn find_by_id(&self, type_of: ActionType, id: ActionId) -> Result<Action> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM actions WHERE id = $1 AND type_of = $2"
        ))
        .bind(id.as_uuid())
        .bind(type_of.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Action", format!("{type_of} {id}")))?;

        Self::row_to_action(row)
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Vec<Action>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM actions WHERE order_number = $1 ORDER BY start_date ASC"
        ))
        .bind(order_number)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_action).collect()
    }

    async fn find_authorize_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Action>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM actions \
             WHERE type_of = $1 AND purpose_transaction_id = $2 ORDER BY start_date ASC"
        ))
        .bind(ActionType::AuthorizeAction.as_str())
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_action).collect()
    }
}

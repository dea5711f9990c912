use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TaskId;
use domain::{ExecutionResult, Task, TaskAttributes, TaskData, TaskName, TaskStatus};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{from_db_count, map_insert_error, to_db_count, to_db_limit};
use crate::{Result, StoreError, TaskRepository, TaskSearch};

const COLUMNS: &str = "id, data, status, runs_at, remaining_number_of_tries, last_tried_at, \
     number_of_tried, execution_results";

/// PostgreSQL-backed task queue.
///
/// `data` stores the tagged payload; `name` and `data_key` are copies used
/// for claiming and for the enqueue guard.
#[derive(Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: PgRow) -> Result<Task> {
        let data: TaskData = serde_json::from_value(row.try_get("data")?)?;
        let status: String = row.try_get("status")?;
        let execution_results: Vec<ExecutionResult> =
            serde_json::from_value(row.try_get("execution_results")?)?;

        Ok(Task {
            id: TaskId::from_uuid(row.try_get::<Uuid, _>("id")?),
            data,
            status: status.parse()?,
            runs_at: row.try_get("runs_at")?,
            remaining_number_of_tries: from_db_count(row.try_get("remaining_number_of_tries")?)?,
            last_tried_at: row.try_get("last_tried_at")?,
            number_of_tried: from_db_count(row.try_get("number_of_tried")?)?,
            execution_results,
        })
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn save(&self, attributes: TaskAttributes) -> Result<Task> {
        let task = Task::new(attributes);

        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, name, data_key, data, status, runs_at, remaining_number_of_tries,
                 number_of_tried, execution_results)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '[]'::jsonb)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.name().as_str())
        .bind(task.data.key())
        .bind(serde_json::to_value(&task.data)?)
        .bind(task.status.as_str())
        .bind(task.runs_at)
        .bind(to_db_count(task.remaining_number_of_tries)?)
        .bind(to_db_count(task.number_of_tried)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error("Task", e))?;

        Ok(task)
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Task> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("Task", id.to_string()))?;

        Self::row_to_task(row)
    }

    async fn find_by_key(&self, name: TaskName, key: &str) -> Result<Option<Task>> {
        sqlx::query(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE name = $1 AND data_key = $2 LIMIT 1"
        ))
        .bind(name.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_task)
        .transpose()
    }

    async fn claim_one_by_name(
        &self,
        name: TaskName,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        sqlx::query(&format!(
            "UPDATE tasks SET status = $4, last_tried_at = $3 \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE name = $1 AND status = $2 AND runs_at <= $3 \
                 ORDER BY runs_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) RETURNING {COLUMNS}"
        ))
        .bind(name.as_str())
        .bind(TaskStatus::Ready.as_str())
        .bind(now)
        .bind(TaskStatus::Running.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_task)
        .transpose()
        .inspect(|claimed| {
            if let Some(task) = claimed {
                tracing::debug!(task_id = %task.id, task_name = %name, "task claimed");
            }
        })
    }

    async fn push_execution_result(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: ExecutionResult,
    ) -> Result<TaskStatus> {
        let result: Value = serde_json::to_value(&result)?;
        // Single-row UPDATE: the CASE reads the status under the row lock.
        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE WHEN status = $4 THEN $2 ELSE status END,
                execution_results = execution_results || jsonb_build_array($3::jsonb)
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(result)
        .bind(TaskStatus::Running.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Task", id.to_string()))?;

        let current: TaskStatus = row.try_get::<String, _>("status")?.parse()?;
        if current != status {
            tracing::warn!(
                task_id = %id,
                requested = %status,
                %current,
                "task left Running before its result arrived, status kept"
            );
        }
        Ok(current)
    }

    async fn retry(&self, last_tried_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = $2, number_of_tried = number_of_tried + 1
            WHERE status = $1
              AND last_tried_at < $3
              AND number_of_tried < remaining_number_of_tries
            "#,
        )
        .bind(TaskStatus::Running.as_str())
        .bind(TaskStatus::Ready.as_str())
        .bind(last_tried_before)
        .execute(&self.pool)
        .await?;

        let retried = result.rows_affected();
        if retried > 0 {
            tracing::debug!(retried, "stale running tasks re-queued");
        }
        Ok(retried)
    }

    async fn abort_one(&self, last_tried_before: DateTime<Utc>) -> Result<Option<Task>> {
        sqlx::query(&format!(
            "UPDATE tasks SET status = $3 \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status = $1 \
                   AND last_tried_at < $2 \
                   AND number_of_tried >= remaining_number_of_tries \
                 ORDER BY last_tried_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) RETURNING {COLUMNS}"
        ))
        .bind(TaskStatus::Running.as_str())
        .bind(last_tried_before)
        .bind(TaskStatus::Aborted.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_task)
        .transpose()
    }

    async fn search(&self, conditions: TaskSearch) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {COLUMNS} FROM tasks WHERE 1=1");
        let mut param_idx = 0;

        if conditions.name.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" AND name = ${param_idx}"));
        }
        if conditions.status.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" AND status = ${param_idx}"));
        }
        sql.push_str(" ORDER BY runs_at ASC");
        if conditions.limit.is_some() {
            param_idx += 1;
            sql.push_str(&format!(" LIMIT ${param_idx}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(name) = conditions.name {
            query = query.bind(name.as_str());
        }
        if let Some(status) = conditions.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = conditions.limit {
            query = query.bind(to_db_limit(limit));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_task).collect()
    }
}

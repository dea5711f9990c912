use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TaskId;
use domain::{ExecutionResult, Task, TaskAttributes, TaskName, TaskStatus};
use tokio::sync::RwLock;

use super::apply_limit;
use crate::{Result, StoreError, TaskRepository, TaskSearch};

#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Overrides when a task was last tried; lets tests age a Running task.
    pub async fn set_last_tried_at(&self, id: TaskId, at: DateTime<Utc>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Task", id.to_string()))?;
        task.last_tried_at = Some(at);
        Ok(())
    }
}

fn is_stale_running(task: &Task, last_tried_before: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Running
        && task
            .last_tried_at
            .is_some_and(|tried| tried < last_tried_before)
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, attributes: TaskAttributes) -> Result<Task> {
        let task = Task::new(attributes);
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Task", id.to_string()))
    }

    async fn find_by_key(&self, name: TaskName, key: &str) -> Result<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .find(|task| task.name() == name && task.data.key() == key)
            .cloned())
    }

    async fn claim_one_by_name(
        &self,
        name: TaskName,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let claimed = tasks
            .values_mut()
            .filter(|task| {
                task.name() == name && task.status == TaskStatus::Ready && task.runs_at <= now
            })
            .min_by_key(|task| task.runs_at);

        Ok(claimed.map(|task| {
            task.status = TaskStatus::Running;
            task.last_tried_at = Some(now);
            task.clone()
        }))
    }

    async fn push_execution_result(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: ExecutionResult,
    ) -> Result<TaskStatus> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Task", id.to_string()))?;
        if task.status == TaskStatus::Running {
            task.status = status;
        } else if task.status != status {
            tracing::warn!(
                task_id = %id,
                requested = %status,
                current = %task.status,
                "task left Running before its result arrived, status kept"
            );
        }
        task.execution_results.push(result);
        Ok(task.status)
    }

    async fn retry(&self, last_tried_before: DateTime<Utc>) -> Result<u64> {
        let mut tasks = self.tasks.write().await;
        let mut changed = 0;
        for task in tasks.values_mut() {
            if is_stale_running(task, last_tried_before) && !task.tries_exhausted() {
                task.status = TaskStatus::Ready;
                task.number_of_tried += 1;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn abort_one(&self, last_tried_before: DateTime<Utc>) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let aborted = tasks
            .values_mut()
            .filter(|task| is_stale_running(task, last_tried_before) && task.tries_exhausted())
            .min_by_key(|task| task.last_tried_at);

        Ok(aborted.map(|task| {
            task.status = TaskStatus::Aborted;
            task.clone()
        }))
    }

    async fn search(&self, conditions: TaskSearch) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|task| conditions.matches(task))
            .cloned()
            .collect();
        found.sort_by_key(|task| task.runs_at);
        Ok(apply_limit(found, conditions.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::TransactionId;
    use domain::TaskData;

    fn place_order_task(now: DateTime<Utc>) -> TaskAttributes {
        TaskAttributes::asap(
            TaskData::PlaceOrder {
                transaction_id: TransactionId::new(),
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_claim_skips_future_and_other_names() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let mut later = place_order_task(now);
        later.runs_at = now + Duration::minutes(5);
        repo.save(later).await.unwrap();

        let claimed = repo
            .claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap();
        assert!(claimed.is_none());

        repo.save(place_order_task(now)).await.unwrap();
        let claimed = repo
            .claim_one_by_name(TaskName::SendOrder, now)
            .await
            .unwrap();
        assert!(claimed.is_none());

        let claimed = repo
            .claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.last_tried_at, Some(now));
        assert_eq!(claimed.number_of_tried, 0);
    }

    #[tokio::test]
    async fn test_claim_picks_earliest_runs_at() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let mut old = place_order_task(now);
        old.runs_at = now - Duration::minutes(10);
        let old = repo.save(old).await.unwrap();
        repo.save(place_order_task(now)).await.unwrap();

        let claimed = repo
            .claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, old.id);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        repo.save(place_order_task(now)).await.unwrap();

        let claims = (0..16).map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.claim_one_by_name(TaskName::PlaceOrder, now).await })
        });
        let results = futures_util::future::join_all(claims).await;

        let winners = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(Some(_)))))
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_retry_counts_tries_and_abort_takes_exhausted() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let mut attributes = place_order_task(now);
        attributes.remaining_number_of_tries = 1;
        let task = repo.save(attributes).await.unwrap();

        repo.claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap();
        let later = now + Duration::seconds(1);

        assert!(repo.abort_one(later).await.unwrap().is_none());
        assert_eq!(repo.retry(later).await.unwrap(), 1);
        let retried = repo.find_by_id(task.id).await.unwrap();
        assert_eq!(retried.status, TaskStatus::Ready);
        assert_eq!(retried.number_of_tried, 1);

        repo.claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap();
        assert_eq!(repo.retry(later).await.unwrap(), 0);
        let aborted = repo.abort_one(later).await.unwrap().unwrap();
        assert_eq!(aborted.id, task.id);
        assert_eq!(aborted.status, TaskStatus::Aborted);
        assert!(repo.abort_one(later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_ignores_recent_attempts() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        repo.save(place_order_task(now)).await.unwrap();
        repo.claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap();

        assert_eq!(repo.retry(now - Duration::seconds(60)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_execution_result_appends() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let task = repo.save(place_order_task(now)).await.unwrap();
        repo.claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap()
            .unwrap();

        repo.push_execution_result(
            task.id,
            TaskStatus::Running,
            ExecutionResult::failure(Utc::now(), "boom"),
        )
        .await
        .unwrap();
        repo.push_execution_result(
            task.id,
            TaskStatus::Executed,
            ExecutionResult::success(Utc::now()),
        )
        .await
        .unwrap();

        let task = repo.find_by_id(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Executed);
        assert_eq!(task.execution_results.len(), 2);
        assert!(task.last_error().is_none());
    }

    #[tokio::test]
    async fn test_find_by_key() {
        let repo = InMemoryTaskRepository::new();
        let attributes = place_order_task(Utc::now());
        let key = attributes.data.key();
        let task = repo.save(attributes).await.unwrap();

        let found = repo.find_by_key(TaskName::PlaceOrder, &key).await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(task.id));
        assert!(
            repo.find_by_key(TaskName::VoidPayment, &key)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_push_execution_result_keeps_status_once_task_left_running() {
        let repo = InMemoryTaskRepository::new();
        let now = Utc::now();
        let task = repo.save(place_order_task(now)).await.unwrap();

        // Still Ready: the result is kept, the status is not touched.
        let status = repo
            .push_execution_result(
                task.id,
                TaskStatus::Executed,
                ExecutionResult::failure(now, "unknown task name"),
            )
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Ready);

        repo.claim_one_by_name(TaskName::PlaceOrder, now)
            .await
            .unwrap()
            .unwrap();
        let status = repo
            .push_execution_result(task.id, TaskStatus::Executed, ExecutionResult::success(now))
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Executed);

        let status = repo
            .push_execution_result(
                task.id,
                TaskStatus::Running,
                ExecutionResult::failure(now, "late failure"),
            )
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Executed);

        let task = repo.find_by_id(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Executed);
        assert_eq!(task.execution_results.len(), 3);
        assert_eq!(task.last_error(), Some("late failure"));
    }
}

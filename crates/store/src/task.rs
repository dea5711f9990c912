use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TaskId;
use domain::{ExecutionResult, Task, TaskAttributes, TaskName, TaskStatus};

use crate::Result;

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskSearch {
    pub name: Option<TaskName>,
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

impl TaskSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: TaskName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.name.is_none_or(|name| task.name() == name)
            && self.status.is_none_or(|status| task.status == status)
    }
}

/// The task queue.
///
/// Claiming is exclusive: a Ready task is handed to exactly one caller of
/// `claim_one_by_name`, however many run concurrently.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Enqueues a new Ready task.
    async fn save(&self, attributes: TaskAttributes) -> Result<Task>;

    async fn find_by_id(&self, id: TaskId) -> Result<Task>;

    /// Any task, in any status, carrying the given name and payload key.
    async fn find_by_key(&self, name: TaskName, key: &str) -> Result<Option<Task>>;

    /// Claims the Ready task of `name` with the earliest `runs_at <= now`,
    /// moving it to Running and stamping `last_tried_at`.
    async fn claim_one_by_name(&self, name: TaskName, now: DateTime<Utc>)
    -> Result<Option<Task>>;

    /// Appends one execution result and, if the task is still Running, moves
    /// it to `status`.
    ///
    /// A task that has left Running (re-queued by the retry sweep, executed by
    /// another worker, or aborted) keeps its status; the result is appended
    /// anyway. Returns the status the task has after the write.
    async fn push_execution_result(
        &self,
        id: TaskId,
        status: TaskStatus,
        result: ExecutionResult,
    ) -> Result<TaskStatus>;

    /// Running tasks last tried before `last_tried_before` with tries left go
    /// back to Ready, counting one more try. Returns how many changed.
    async fn retry(&self, last_tried_before: DateTime<Utc>) -> Result<u64>;

    /// Aborts one Running task last tried before `last_tried_before` whose
    /// tries are exhausted.
    async fn abort_one(&self, last_tried_before: DateTime<Utc>) -> Result<Option<Task>>;

    async fn search(&self, conditions: TaskSearch) -> Result<Vec<Task>>;
}

//! Claiming and executing tasks, and the retry and abort sweeps.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use domain::{ExecutionResult, Task, TaskName, TaskStatus};
use store::TaskRepository;

use crate::Result;
use crate::handler::TaskRegistry;
use crate::notifier::{Alert, Notifier};

/// Runs tasks from the queue through their registered handlers.
///
/// A handler failure is recorded on the task and leaves it Running; the
/// retry sweep makes it claimable again once it has been idle for the retry
/// interval, and the abort sweep gives up on it when its tries are used up.
/// Only store failures are returned as errors.
#[derive(Clone)]
pub struct TaskRuntime {
    tasks: Arc<dyn TaskRepository>,
    registry: TaskRegistry,
    notifier: Arc<dyn Notifier>,
}

impl TaskRuntime {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        registry: TaskRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tasks,
            registry,
            notifier,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Claims and executes one due task of `name`.
    ///
    /// Returns the task as executed, or `None` when no task was due.
    pub async fn execute_by_name(&self, name: TaskName) -> Result<Option<Task>> {
        let Some(task) = self.tasks.claim_one_by_name(name, Utc::now()).await? else {
            return Ok(None);
        };
        self.execute(task).await.map(Some)
    }

    /// Executes a claimed task and records the outcome.
    #[tracing::instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name()))]
    pub async fn execute(&self, mut task: Task) -> Result<Task> {
        let name = task.name();

        let Some(handler) = self.registry.get(name) else {
            metrics::counter!("tasks_unknown_total", "task_name" => name.as_str()).increment(1);
            tracing::warn!("no handler registered for task");
            let status = task.status;
            let result = ExecutionResult::failure(Utc::now(), format!("unknown task name {name}"));
            self.record(&mut task, status, result).await?;
            return Ok(task);
        };

        let started = Instant::now();
        let outcome = handler.handle(&task.data).await;
        metrics::histogram!("task_duration_seconds", "task_name" => name.as_str())
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                metrics::counter!("tasks_executed_total", "task_name" => name.as_str())
                    .increment(1);
                tracing::info!("task executed");
                self.record(&mut task, TaskStatus::Executed, ExecutionResult::success(Utc::now()))
                    .await?;
            }
            Err(err) => {
                metrics::counter!("tasks_failed_total", "task_name" => name.as_str()).increment(1);
                tracing::warn!(error = %err, number_of_tried = task.number_of_tried, "task failed");
                let status = task.status;
                let result = ExecutionResult::failure(Utc::now(), err.to_string());
                self.record(&mut task, status, result).await?;
            }
        }
        Ok(task)
    }

    /// Makes tasks idle in Running for longer than `interval` claimable again.
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, interval: Duration) -> Result<u64> {
        let retried = self.tasks.retry(Utc::now() - interval).await?;
        if retried > 0 {
            metrics::counter!("tasks_retried_total").increment(retried);
            tracing::info!(retried, "tasks returned to the queue");
        }
        Ok(retried)
    }

    /// Aborts tasks idle in Running for longer than `interval` whose tries
    /// are used up, sending one alert per task.
    ///
    /// A failed alert is logged and does not stop the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn abort(&self, interval: Duration) -> Result<Vec<Task>> {
        let last_tried_before = Utc::now() - interval;
        let mut aborted = Vec::new();

        while let Some(task) = self.tasks.abort_one(last_tried_before).await? {
            metrics::counter!("tasks_aborted_total", "task_name" => task.name().as_str())
                .increment(1);
            tracing::error!(
                task_id = %task.id,
                task_name = %task.name(),
                number_of_tried = task.number_of_tried,
                "task aborted"
            );

            let alert = abort_alert(&task);
            if let Err(err) = self.notifier.notify(&alert).await {
                tracing::error!(task_id = %task.id, error = %err, "failed to notify about aborted task");
            }
            aborted.push(task);
        }
        Ok(aborted)
    }

    /// Stores the outcome. The status only applies while the task is still
    /// Running; a worker that outlived the retry interval cannot reopen a
    /// task another worker has finished.
    async fn record(&self, task: &mut Task, status: TaskStatus, result: ExecutionResult) -> Result<()> {
        task.status = self
            .tasks
            .push_execution_result(task.id, status, result.clone())
            .await?;
        task.execution_results.push(result);
        Ok(())
    }
}

fn abort_alert(task: &Task) -> Alert {
    Alert {
        subject: format!("task {} aborted", task.name()),
        details: format!(
            "id: {}\nruns_at: {}\nnumber_of_tried: {}\nlast_error: {}",
            task.id,
            task.runs_at,
            task.number_of_tried,
            task.last_error().unwrap_or("none")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{TaskAttributes, TaskData, TransactionId};
    use saga::SagaError;
    use store::InMemoryTaskRepository;
    use tokio::sync::RwLock;

    use crate::handler::TaskHandler;
    use crate::notifier::InMemoryNotifier;

    /// Counts invocations and fails while `fail` is set.
    #[derive(Default)]
    struct CountingHandler {
        calls: RwLock<u32>,
        fail: RwLock<bool>,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(&self, _data: &TaskData) -> Result<()> {
            *self.calls.write().await += 1;
            if *self.fail.read().await {
                return Err(SagaError::Payment("gateway timeout".to_string()).into());
            }
            Ok(())
        }
    }

    struct Fixture {
        runtime: TaskRuntime,
        tasks: Arc<InMemoryTaskRepository>,
        handler: Arc<CountingHandler>,
        notifier: InMemoryNotifier,
    }

    fn fixture() -> Fixture {
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let handler = Arc::new(CountingHandler::default());
        let notifier = InMemoryNotifier::new();

        let mut registry = TaskRegistry::new();
        registry.register(TaskName::VoidPayment, handler.clone());

        Fixture {
            runtime: TaskRuntime::new(tasks.clone(), registry, Arc::new(notifier.clone())),
            tasks,
            handler,
            notifier,
        }
    }

    async fn enqueue(tasks: &InMemoryTaskRepository, data: TaskData) -> Task {
        tasks
            .save(TaskAttributes::asap(data, Utc::now()))
            .await
            .unwrap()
    }

    fn void_payment() -> TaskData {
        TaskData::VoidPayment {
            transaction_id: TransactionId::new(),
        }
    }

    #[tokio::test]
    async fn test_execute_by_name_runs_handler() {
        let f = fixture();
        let task = enqueue(&f.tasks, void_payment()).await;

        let executed = f
            .runtime
            .execute_by_name(TaskName::VoidPayment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executed.id, task.id);
        assert_eq!(executed.status, TaskStatus::Executed);
        assert_eq!(*f.handler.calls.read().await, 1);

        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Executed);
        assert_eq!(stored.execution_results.len(), 1);
        assert!(stored.last_error().is_none());
    }

    #[tokio::test]
    async fn test_execute_by_name_without_due_task() {
        let f = fixture();
        let result = f.runtime.execute_by_name(TaskName::VoidPayment).await.unwrap();
        assert!(result.is_none());
        assert_eq!(*f.handler.calls.read().await, 0);
    }

    #[tokio::test]
    async fn test_handler_failure_leaves_task_running() {
        let f = fixture();
        *f.handler.fail.write().await = true;
        let task = enqueue(&f.tasks, void_payment()).await;

        let executed = f
            .runtime
            .execute_by_name(TaskName::VoidPayment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executed.status, TaskStatus::Running);

        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert_eq!(stored.number_of_tried, 0);
        assert!(stored.last_error().unwrap().contains("gateway timeout"));

        // still Running, so not claimable until the retry sweep
        let again = f.runtime.execute_by_name(TaskName::VoidPayment).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_unknown_task_name_is_recorded() {
        let f = fixture();
        let task = enqueue(
            &f.tasks,
            TaskData::CancelSeatReservation {
                transaction_id: TransactionId::new(),
            },
        )
        .await;

        let executed = f
            .runtime
            .execute_by_name(TaskName::CancelSeatReservation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executed.status, TaskStatus::Running);

        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.execution_results.len(), 1);
        assert!(stored.last_error().unwrap().contains("unknown task name"));
        assert_eq!(stored.number_of_tried, 0);
        assert_eq!(stored.remaining_number_of_tries, task.remaining_number_of_tries);
    }

    #[tokio::test]
    async fn test_retry_waits_for_interval() {
        let f = fixture();
        *f.handler.fail.write().await = true;
        let task = enqueue(&f.tasks, void_payment()).await;
        f.runtime.execute_by_name(TaskName::VoidPayment).await.unwrap();

        assert_eq!(f.runtime.retry(Duration::minutes(1)).await.unwrap(), 0);
        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Running);

        f.tasks
            .set_last_tried_at(task.id, Utc::now() - Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(f.runtime.retry(Duration::minutes(1)).await.unwrap(), 1);

        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Ready);
        assert_eq!(stored.number_of_tried, 1);

        *f.handler.fail.write().await = false;
        let executed = f
            .runtime
            .execute_by_name(TaskName::VoidPayment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executed.status, TaskStatus::Executed);
        assert_eq!(executed.execution_results.len(), 2);
    }

    #[tokio::test]
    async fn test_late_failure_keeps_task_executed() {
        let f = fixture();
        let task = enqueue(&f.tasks, void_payment()).await;

        // A worker claims the task and stalls past the retry interval.
        let stale = f
            .tasks
            .claim_one_by_name(TaskName::VoidPayment, Utc::now())
            .await
            .unwrap()
            .unwrap();
        f.tasks
            .set_last_tried_at(task.id, Utc::now() - Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(f.runtime.retry(Duration::minutes(1)).await.unwrap(), 1);

        let executed = f
            .runtime
            .execute_by_name(TaskName::VoidPayment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executed.status, TaskStatus::Executed);

        // The stalled worker's handler finally fails.
        *f.handler.fail.write().await = true;
        let late = f.runtime.execute(stale).await.unwrap();
        assert_eq!(late.status, TaskStatus::Executed);

        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Executed);
        assert_eq!(stored.execution_results.len(), 2);
        assert!(stored.last_error().unwrap().contains("gateway timeout"));

        f.tasks
            .set_last_tried_at(task.id, Utc::now() - Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(f.runtime.retry(Duration::minutes(1)).await.unwrap(), 0);
        assert!(
            f.runtime
                .execute_by_name(TaskName::VoidPayment)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_abort_exhausted_task_notifies_once() {
        let f = fixture();
        *f.handler.fail.write().await = true;
        let task = f
            .tasks
            .save(TaskAttributes {
                data: void_payment(),
                runs_at: Utc::now(),
                remaining_number_of_tries: 1,
            })
            .await
            .unwrap();

        // first attempt fails, the sweep counts it, the second attempt fails too
        f.runtime.execute_by_name(TaskName::VoidPayment).await.unwrap();
        f.tasks
            .set_last_tried_at(task.id, Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(f.runtime.retry(Duration::minutes(1)).await.unwrap(), 1);
        f.runtime.execute_by_name(TaskName::VoidPayment).await.unwrap();
        f.tasks
            .set_last_tried_at(task.id, Utc::now() - Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(f.runtime.retry(Duration::minutes(1)).await.unwrap(), 0);
        let aborted = f.runtime.abort(Duration::minutes(1)).await.unwrap();
        assert_eq!(aborted.len(), 1);
        assert_eq!(aborted[0].status, TaskStatus::Aborted);

        let alerts = f.notifier.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].details.contains("gateway timeout"));

        assert!(f.runtime.abort(Duration::minutes(1)).await.unwrap().is_empty());
        assert_eq!(f.notifier.alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_abort_survives_notification_failure() {
        let f = fixture();
        f.notifier.set_fail_on_notify(true).await;
        let task = f
            .tasks
            .save(TaskAttributes {
                data: void_payment(),
                runs_at: Utc::now(),
                remaining_number_of_tries: 0,
            })
            .await
            .unwrap();
        f.tasks
            .claim_one_by_name(TaskName::VoidPayment, Utc::now())
            .await
            .unwrap()
            .unwrap();
        f.tasks
            .set_last_tried_at(task.id, Utc::now() - Duration::minutes(5))
            .await
            .unwrap();

        let aborted = f.runtime.abort(Duration::minutes(1)).await.unwrap();
        assert_eq!(aborted.len(), 1);
        assert_eq!(f.notifier.alerts().await.len(), 1);

        let stored = f.tasks.find_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Aborted);
    }
}

//! Turning finished transactions into tasks.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::{
    Task, TaskAttributes, TaskData, Transaction, TransactionStatus, TransactionType,
};
use store::{TaskRepository, TransactionRepository};

use crate::error::{Result, SagaError};

/// Every `(type, status)` pair whose transactions have tasks to export.
pub const EXPORTABLE: [(TransactionType, TransactionStatus); 6] = [
    (TransactionType::PlaceOrder, TransactionStatus::Confirmed),
    (TransactionType::PlaceOrder, TransactionStatus::Expired),
    (TransactionType::PlaceOrder, TransactionStatus::Canceled),
    (TransactionType::ReturnOrder, TransactionStatus::Confirmed),
    (TransactionType::ReturnOrder, TransactionStatus::Expired),
    (TransactionType::ReturnOrder, TransactionStatus::Canceled),
];

/// Saves a task unless one with the same name and payload key already exists.
///
/// Returns the new task, or `None` when the work was already enqueued.
pub async fn enqueue_once(
    tasks: &dyn TaskRepository,
    data: TaskData,
    now: DateTime<Utc>,
) -> Result<Option<Task>> {
    let name = data.name();
    let key = data.key();

    if let Some(existing) = tasks.find_by_key(name, &key).await? {
        tracing::debug!(task_id = %existing.id, task_name = %name, key = %key, "task already enqueued");
        return Ok(None);
    }

    let task = tasks.save(TaskAttributes::asap(data, now)).await?;
    metrics::counter!("tasks_exported_total", "task_name" => name.as_str()).increment(1);
    tracing::debug!(task_id = %task.id, task_name = %name, "task enqueued");
    Ok(Some(task))
}

/// The tasks a transaction produces once it has left InProgress.
pub fn tasks_for_transaction(transaction: &Transaction) -> Result<Vec<TaskData>> {
    let transaction_id = transaction.id;

    match (transaction.type_of(), transaction.status) {
        (type_of, TransactionStatus::InProgress) => Err(SagaError::NotImplemented(format!(
            "no tasks are defined for an InProgress {type_of} transaction"
        ))),
        (TransactionType::PlaceOrder, TransactionStatus::Confirmed) => {
            Ok(vec![TaskData::PlaceOrder { transaction_id }])
        }
        (
            TransactionType::PlaceOrder,
            TransactionStatus::Expired | TransactionStatus::Canceled,
        ) => Ok(vec![
            TaskData::CancelSeatReservation { transaction_id },
            TaskData::VoidPayment { transaction_id },
        ]),
        (TransactionType::ReturnOrder, TransactionStatus::Confirmed) => {
            Ok(vec![TaskData::ReturnOrder { transaction_id }])
        }
        (
            TransactionType::ReturnOrder,
            TransactionStatus::Expired | TransactionStatus::Canceled,
        ) => Ok(Vec::new()),
    }
}

/// Exports transaction tasks and runs the transaction housekeeping sweeps.
#[derive(Clone)]
pub struct TaskExporter {
    transactions: Arc<dyn TransactionRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl TaskExporter {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            transactions,
            tasks,
        }
    }

    /// Claims one pending transaction of the given type and status, saves its
    /// tasks and marks it exported.
    ///
    /// Returns the exported transaction, or `None` if nothing was pending. A
    /// crash between the claim and the final mark leaves the transaction in
    /// Exporting; `reexport_tasks` picks it up again and the enqueue guard
    /// keeps the second pass from duplicating tasks.
    #[tracing::instrument(skip(self), fields(type_of = %type_of, status = %status))]
    pub async fn export_tasks(
        &self,
        type_of: TransactionType,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>> {
        let Some(transaction) = self.transactions.start_export_tasks(type_of, status).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut created = 0;
        for data in tasks_for_transaction(&transaction)? {
            if enqueue_once(self.tasks.as_ref(), data, now).await?.is_some() {
                created += 1;
            }
        }

        self.transactions
            .set_tasks_exported_by_id(transaction.id)
            .await?;
        tracing::info!(transaction_id = %transaction.id, created, "transaction tasks exported");
        Ok(Some(transaction))
    }

    /// Releases export claims older than `interval`.
    pub async fn reexport_tasks(&self, interval: Duration) -> Result<u64> {
        let reset = self
            .transactions
            .reexport_tasks(Utc::now() - interval)
            .await?;
        if reset > 0 {
            tracing::warn!(reset, "stuck task exports released");
        }
        Ok(reset)
    }

    /// Expires every InProgress transaction past its expiry.
    pub async fn make_expired(&self) -> Result<u64> {
        let expired = self.transactions.make_expired(Utc::now()).await?;
        if expired > 0 {
            tracing::info!(expired, "transactions expired");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TransactionId;
    use domain::{Agent, PlaceOrderObject, Seller, TransactionAttributes, TransactionObject};
    use store::InMemoryTaskRepository;

    fn place_order(status: TransactionStatus) -> Transaction {
        let mut transaction = Transaction::start(
            TransactionAttributes {
                agent: Agent::new("customer-1"),
                object: TransactionObject::PlaceOrder(PlaceOrderObject::new(Seller {
                    id: "seller-1".to_string(),
                    name: "Cinema".to_string(),
                    email: "box-office@example.com".to_string(),
                })),
                expires: Utc::now(),
            },
            Utc::now(),
        );
        transaction.status = status;
        transaction
    }

    #[test]
    fn test_in_progress_is_not_implemented() {
        let err = tasks_for_transaction(&place_order(TransactionStatus::InProgress)).unwrap_err();
        assert!(matches!(err, SagaError::NotImplemented(_)));
    }

    #[test]
    fn test_abandoned_place_order_releases_authorizations() {
        for status in [TransactionStatus::Expired, TransactionStatus::Canceled] {
            let transaction = place_order(status);
            let names: Vec<_> = tasks_for_transaction(&transaction)
                .unwrap()
                .iter()
                .map(|data| data.name())
                .collect();
            assert_eq!(
                names,
                vec![
                    domain::TaskName::CancelSeatReservation,
                    domain::TaskName::VoidPayment
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_enqueue_once_skips_duplicates() {
        let repo = InMemoryTaskRepository::new();
        let transaction_id = TransactionId::new();
        let now = Utc::now();

        let first = enqueue_once(&repo, TaskData::PlaceOrder { transaction_id }, now)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = enqueue_once(&repo, TaskData::PlaceOrder { transaction_id }, now)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(repo.count().await, 1);

        // Same key, different kind of work.
        let other = enqueue_once(&repo, TaskData::VoidPayment { transaction_id }, now)
            .await
            .unwrap();
        assert!(other.is_some());
    }
}

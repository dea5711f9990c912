use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use domain::{
    PotentialActions, TasksExportationStatus, Transaction, TransactionAttributes,
    TransactionObject, TransactionResult, TransactionStatus, TransactionType,
};
use tokio::sync::RwLock;

use super::apply_limit;
use crate::transaction::validate_confirmation;
use crate::{Result, StoreError, TransactionRepository, TransactionSearch};

/// In-memory transaction repository for tests and database-less runs.
#[derive(Clone, Default)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

fn not_found(type_of: TransactionType, id: TransactionId) -> StoreError {
    StoreError::not_found("Transaction", format!("{type_of} {id}"))
}

fn in_progress_mut(
    transactions: &mut HashMap<TransactionId, Transaction>,
    type_of: TransactionType,
    id: TransactionId,
) -> Result<&mut Transaction> {
    transactions
        .get_mut(&id)
        .filter(|tx| tx.type_of() == type_of && tx.status == TransactionStatus::InProgress)
        .ok_or_else(|| {
            StoreError::not_found("Transaction", format!("InProgress {type_of} {id}"))
        })
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn start(&self, attributes: TransactionAttributes) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;

        if let TransactionObject::ReturnOrder(object) = &attributes.object {
            let duplicate = transactions.values().any(|existing| {
                existing
                    .return_order_object()
                    .is_some_and(|other| other.transaction.id == object.transaction.id)
            });
            if duplicate {
                return Err(StoreError::already_in_use(
                    "Transaction",
                    format!("a return of {} already exists", object.transaction.id),
                ));
            }
        }

        let transaction = Transaction::start(attributes, Utc::now());
        transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn find_by_id(
        &self,
        type_of: TransactionType,
        id: TransactionId,
    ) -> Result<Transaction> {
        self.transactions
            .read()
            .await
            .get(&id)
            .filter(|tx| tx.type_of() == type_of)
            .cloned()
            .ok_or_else(|| not_found(type_of, id))
    }

    async fn find_in_progress_by_id(
        &self,
        type_of: TransactionType,
        id: TransactionId,
    ) -> Result<Transaction> {
        let transaction = self.find_by_id(type_of, id).await?;
        if transaction.status != TransactionStatus::InProgress {
            return Err(StoreError::not_found(
                "Transaction",
                format!("InProgress {type_of} {id}"),
            ));
        }
        Ok(transaction)
    }

    async fn update_object(
        &self,
        id: TransactionId,
        object: TransactionObject,
    ) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let transaction = in_progress_mut(&mut transactions, object.type_of(), id)?;
        transaction.object = object;
        Ok(transaction.clone())
    }

    async fn confirm(
        &self,
        type_of: TransactionType,
        id: TransactionId,
        result: TransactionResult,
        potential_actions: PotentialActions,
    ) -> Result<Transaction> {
        validate_confirmation(type_of, &result, &potential_actions)?;

        let mut transactions = self.transactions.write().await;
        let transaction = in_progress_mut(&mut transactions, type_of, id)?;
        let now = Utc::now();
        transaction.status = TransactionStatus::Confirmed;
        transaction.result = Some(result);
        transaction.potential_actions = Some(potential_actions);
        transaction.end_date = Some(now);
        transaction.updated_at = now;
        Ok(transaction.clone())
    }

    async fn cancel(&self, type_of: TransactionType, id: TransactionId) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let transaction = in_progress_mut(&mut transactions, type_of, id)?;
        let now = Utc::now();
        transaction.status = TransactionStatus::Canceled;
        transaction.end_date = Some(now);
        transaction.updated_at = now;
        Ok(transaction.clone())
    }

    async fn make_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut transactions = self.transactions.write().await;
        let mut changed = 0;
        for transaction in transactions.values_mut() {
            if transaction.status == TransactionStatus::InProgress && transaction.expires < now {
                transaction.status = TransactionStatus::Expired;
                transaction.end_date = Some(now);
                transaction.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn start_export_tasks(
        &self,
        type_of: TransactionType,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>> {
        let mut transactions = self.transactions.write().await;
        let claimed = transactions
            .values_mut()
            .filter(|tx| {
                tx.type_of() == type_of
                    && tx.status == status
                    && tx.tasks_exportation_status == TasksExportationStatus::Unexported
            })
            .min_by_key(|tx| tx.updated_at);

        Ok(claimed.map(|transaction| {
            transaction.tasks_exportation_status = TasksExportationStatus::Exporting;
            transaction.updated_at = Utc::now();
            transaction.clone()
        }))
    }

    async fn set_tasks_exported_by_id(&self, id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .filter(|tx| tx.tasks_exportation_status == TasksExportationStatus::Exporting)
            .ok_or_else(|| StoreError::not_found("Transaction", format!("Exporting {id}")))?;
        let now = Utc::now();
        transaction.tasks_exportation_status = TasksExportationStatus::Exported;
        transaction.tasks_exported_at = Some(now);
        transaction.updated_at = now;
        Ok(())
    }

    async fn reexport_tasks(&self, updated_before: DateTime<Utc>) -> Result<u64> {
        let mut transactions = self.transactions.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for transaction in transactions.values_mut() {
            if transaction.tasks_exportation_status == TasksExportationStatus::Exporting
                && transaction.updated_at < updated_before
            {
                transaction.tasks_exportation_status = TasksExportationStatus::Unexported;
                transaction.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn search(&self, conditions: TransactionSearch) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut found: Vec<Transaction> = transactions
            .values()
            .filter(|tx| conditions.matches(tx))
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.start_date);
        Ok(apply_limit(found, conditions.limit))
    }
}

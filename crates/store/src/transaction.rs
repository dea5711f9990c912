use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use domain::{
    PotentialActions, TasksExportationStatus, Transaction, TransactionAttributes,
    TransactionObject, TransactionResult, TransactionStatus, TransactionType,
};

use crate::Result;

/// Filter for listing transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionSearch {
    pub type_of: Option<TransactionType>,
    /// Match any of these statuses.
    pub statuses: Option<Vec<TransactionStatus>>,
    pub tasks_exportation_status: Option<TasksExportationStatus>,
    pub limit: Option<usize>,
}

impl TransactionSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_of(mut self, type_of: TransactionType) -> Self {
        self.type_of = Some(type_of);
        self
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.statuses = Some(vec![status]);
        self
    }

    pub fn statuses(mut self, statuses: Vec<TransactionStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn tasks_exportation_status(mut self, status: TasksExportationStatus) -> Self {
        self.tasks_exportation_status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        if let Some(type_of) = self.type_of
            && transaction.type_of() != type_of
        {
            return false;
        }
        if let Some(statuses) = &self.statuses
            && !statuses.contains(&transaction.status)
        {
            return false;
        }
        if let Some(status) = self.tasks_exportation_status
            && transaction.tasks_exportation_status != status
        {
            return false;
        }
        true
    }
}

/// Storage for saga transactions.
///
/// The repository owns `status` and `tasks_exportation_status`; every change
/// of either is a conditional write that fails (or reports nothing) when the
/// prior status does not match.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists a new InProgress transaction.
    ///
    /// Fails with `AlreadyInUse` when a ReturnOrder transaction already exists
    /// for the same PlaceOrder transaction.
    async fn start(&self, attributes: TransactionAttributes) -> Result<Transaction>;

    /// Fails with `NotFound` if no transaction of that type has the id.
    async fn find_by_id(&self, type_of: TransactionType, id: TransactionId)
    -> Result<Transaction>;

    /// Fails with `NotFound` unless the transaction exists and is InProgress.
    async fn find_in_progress_by_id(
        &self,
        type_of: TransactionType,
        id: TransactionId,
    ) -> Result<Transaction>;

    /// Replaces the business object of an InProgress transaction.
    async fn update_object(&self, id: TransactionId, object: TransactionObject)
    -> Result<Transaction>;

    /// InProgress → Confirmed, recording the result and follow-up actions.
    ///
    /// Fails with `NotFound` if the transaction is not InProgress, which makes
    /// a second confirmation of the same transaction an error.
    async fn confirm(
        &self,
        type_of: TransactionType,
        id: TransactionId,
        result: TransactionResult,
        potential_actions: PotentialActions,
    ) -> Result<Transaction>;

    /// InProgress → Canceled.
    async fn cancel(&self, type_of: TransactionType, id: TransactionId) -> Result<Transaction>;

    /// Moves every InProgress transaction whose expiry is before `now` to
    /// Expired. Returns how many transactions changed.
    async fn make_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Claims one transaction of the given type and status for task export,
    /// flipping it Unexported → Exporting.
    async fn start_export_tasks(
        &self,
        type_of: TransactionType,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>>;

    /// Exporting → Exported.
    async fn set_tasks_exported_by_id(&self, id: TransactionId) -> Result<()>;

    /// Resets transactions stuck in Exporting since before `updated_before`
    /// back to Unexported. Returns how many transactions changed.
    async fn reexport_tasks(&self, updated_before: DateTime<Utc>) -> Result<u64>;

    async fn search(&self, conditions: TransactionSearch) -> Result<Vec<Transaction>>;
}

/// Rejects a result or follow-up set that belongs to a different saga type.
pub(crate) fn validate_confirmation(
    type_of: TransactionType,
    result: &TransactionResult,
    potential_actions: &PotentialActions,
) -> Result<()> {
    if result.type_of() != type_of || potential_actions.type_of() != type_of {
        return Err(crate::StoreError::Argument(format!(
            "confirmation payload does not belong to a {type_of} transaction"
        )));
    }
    Ok(())
}

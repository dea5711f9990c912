use async_trait::async_trait;
use common::{ActionId, TransactionId};
use domain::{Action, ActionAttributes, ActionType};

use crate::Result;

/// The action ledger.
///
/// Actions are only ever closed from Active, so `complete` and `give_up` are
/// mutually exclusive for a given action.
#[async_trait]
pub trait ActionRepository: Send + Sync {
    /// Records a new Active action.
    async fn start(&self, attributes: ActionAttributes) -> Result<Action>;

    /// Active → Completed with a result. `NotFound` unless the action is Active.
    async fn complete(
        &self,
        type_of: ActionType,
        id: ActionId,
        result: serde_json::Value,
    ) -> Result<Action>;

    /// Active → Failed with an error. `NotFound` unless the action is Active.
    async fn give_up(
        &self,
        type_of: ActionType,
        id: ActionId,
        error: serde_json::Value,
    ) -> Result<Action>;

    async fn find_by_id(&self, type_of: ActionType, id: ActionId) -> Result<Action>;

    /// Actions about an order, oldest first.
    async fn find_by_order_number(&self, order_number: &str) -> Result<Vec<Action>>;

    /// Authorization actions performed for a transaction, oldest first.
    async fn find_authorize_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Action>>;
}

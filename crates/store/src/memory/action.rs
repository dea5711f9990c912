use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ActionId, TransactionId};
use domain::{Action, ActionAttributes, ActionStatus, ActionType};
use tokio::sync::RwLock;

use crate::{ActionRepository, Result, StoreError};

#[derive(Clone, Default)]
pub struct InMemoryActionRepository {
    actions: Arc<RwLock<HashMap<ActionId, Action>>>,
}

impl InMemoryActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn close(
        &self,
        type_of: ActionType,
        id: ActionId,
        status: ActionStatus,
        outcome: serde_json::Value,
    ) -> Result<Action> {
        let mut actions = self.actions.write().await;
        let action = actions
            .get_mut(&id)
            .filter(|a| a.type_of == type_of && a.action_status == ActionStatus::ActiveActionStatus)
            .ok_or_else(|| StoreError::not_found("Action", format!("Active {type_of} {id}")))?;

        action.action_status = status;
        match status {
            ActionStatus::CompletedActionStatus => action.result = Some(outcome),
            _ => action.error = Some(outcome),
        }
        action.end_date = Some(Utc::now());
        Ok(action.clone())
    }

    async fn collect(&self, predicate: impl Fn(&Action) -> bool) -> Vec<Action> {
        let actions = self.actions.read().await;
        let mut found: Vec<Action> = actions.values().filter(|a| predicate(a)).cloned().collect();
        found.sort_by_key(|a| a.start_date);
        found
    }
}

#[async_trait]
impl ActionRepository for InMemoryActionRepository {
    async fn start(&self, attributes: ActionAttributes) -> Result<Action> {
        let action = Action::start(attributes, Utc::now());
        self.actions.write().await.insert(action.id, action.clone());
        Ok(action)
    }

    async fn complete(
        &self,
        type_of: ActionType,
        id: ActionId,
        result: serde_json::Value,
    ) -> Result<Action> {
        self.close(type_of, id, ActionStatus::CompletedActionStatus, result)
            .await
    }

    async fn give_up(
        &self,
        type_of: ActionType,
        id: ActionId,
        error: serde_json::Value,
    ) -> Result<Action> {
        self.close(type_of, id, ActionStatus::FailedActionStatus, error)
            .await
    }

    async fn find_by_id(&self, type_of: ActionType, id: ActionId) -> Result<Action> {
        self.actions
            .read()
            .await
            .get(&id)
            .filter(|a| a.type_of == type_of)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Action", format!("{type_of} {id}")))
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Vec<Action>> {
        Ok(self
            .collect(|a| a.order_number() == Some(order_number))
            .await)
    }

    async fn find_authorize_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Action>> {
        Ok(self
            .collect(|a| {
                a.type_of == ActionType::AuthorizeAction
                    && a.purpose_transaction_id() == Some(transaction_id)
            })
            .await)
    }
}

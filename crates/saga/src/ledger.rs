//! Running work under the action ledger.

use std::future::Future;
use std::sync::Arc;

use domain::{Action, ActionAttributes};
use serde::Serialize;
use serde_json::json;
use store::ActionRepository;

use crate::error::{Result, SagaError};

/// Records a unit of work in the action ledger around its execution.
///
/// The action is started before the work runs. On success it is completed
/// with the serialized output; if the work fails, or its output cannot be
/// serialized, the action is given up and that error is returned. A failure to give up is only logged, so it can never
/// replace the error that caused it.
#[derive(Clone)]
pub struct ActionLedger {
    actions: Arc<dyn ActionRepository>,
}

impl ActionLedger {
    pub fn new(actions: Arc<dyn ActionRepository>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &Arc<dyn ActionRepository> {
        &self.actions
    }

    /// Runs `work` as a new action and returns the completed action with the
    /// work's output.
    pub async fn run<T, F, Fut>(&self, attributes: ActionAttributes, work: F) -> Result<(Action, T)>
    where
        T: Serialize + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let action = self.actions.start(attributes).await?;

        let output = match work().await {
            Ok(output) => output,
            Err(err) => {
                self.give_up(&action, &err).await;
                return Err(err);
            }
        };

        let result = match serde_json::to_value(&output) {
            Ok(result) => result,
            Err(err) => {
                let err = SagaError::from(err);
                self.give_up(&action, &err).await;
                return Err(err);
            }
        };
        let completed = self
            .actions
            .complete(action.type_of, action.id, result)
            .await?;
        Ok((completed, output))
    }

    async fn give_up(&self, action: &Action, err: &SagaError) {
        metrics::counter!("actions_given_up_total", "type_of" => action.type_of.as_str())
            .increment(1);

        let error = json!({ "name": error_name(err), "message": err.to_string() });
        if let Err(give_up_err) = self.actions.give_up(action.type_of, action.id, error).await {
            tracing::error!(
                action_id = %action.id,
                type_of = %action.type_of,
                error = %give_up_err,
                original_error = %err,
                "failed to give up action"
            );
        }
    }
}

fn error_name(err: &SagaError) -> &'static str {
    match err {
        SagaError::NotFound { .. } => "NotFound",
        SagaError::Argument(_) => "Argument",
        SagaError::AlreadyInUse { .. } => "AlreadyInUse",
        SagaError::Forbidden(_) => "Forbidden",
        SagaError::NotImplemented(_) => "NotImplemented",
        SagaError::Payment(_) => "Payment",
        SagaError::Reservation(_) => "Reservation",
        SagaError::Mailer(_) => "Mailer",
        SagaError::Store(_) => "Store",
        SagaError::Serialization(_) => "Serialization",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{ActionId, TransactionId};
    use domain::{ActionStatus, ActionType, Agent};
    use store::{InMemoryActionRepository, StoreError};

    fn attributes() -> ActionAttributes {
        ActionAttributes::new(
            ActionType::SendAction,
            Agent::system(),
            json!({"order_number": "N-1"}),
        )
    }

    #[tokio::test]
    async fn test_run_completes_with_output() {
        let repo = Arc::new(InMemoryActionRepository::new());
        let ledger = ActionLedger::new(repo.clone());

        let (action, output) = ledger
            .run(attributes(), || async { Ok(json!({"delivered": true})) })
            .await
            .unwrap();

        assert_eq!(output, json!({"delivered": true}));
        assert_eq!(action.action_status, ActionStatus::CompletedActionStatus);
        assert_eq!(action.result, Some(json!({"delivered": true})));
    }

    #[tokio::test]
    async fn test_run_gives_up_and_returns_original_error() {
        let repo = Arc::new(InMemoryActionRepository::new());
        let ledger = ActionLedger::new(repo.clone());

        let err = ledger
            .run(attributes(), || async {
                Err::<(), _>(SagaError::Reservation("seat taken".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Reservation(_)));

        let actions = repo.find_by_order_number("N-1").await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_status, ActionStatus::FailedActionStatus);
        assert_eq!(actions[0].error.as_ref().unwrap()["name"], "Reservation");
    }

    #[derive(Debug)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(
            &self,
            _serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no JSON form"))
        }
    }

    #[tokio::test]
    async fn test_unserializable_output_is_given_up() {
        let repo = Arc::new(InMemoryActionRepository::new());
        let ledger = ActionLedger::new(repo.clone());

        let err = ledger
            .run(attributes(), || async { Ok(Unserializable) })
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Serialization(_)));

        let actions = repo.find_by_order_number("N-1").await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_status, ActionStatus::FailedActionStatus);
        assert_eq!(actions[0].error.as_ref().unwrap()["name"], "Serialization");
    }

    /// Starts actions normally but refuses to give them up.
    struct BrokenGiveUp {
        inner: InMemoryActionRepository,
    }

    #[async_trait]
    impl ActionRepository for BrokenGiveUp {
        async fn start(&self, attributes: ActionAttributes) -> store::Result<Action> {
            self.inner.start(attributes).await
        }
        async fn complete(
            &self,
            type_of: ActionType,
            id: ActionId,
            result: serde_json::Value,
        ) -> store::Result<Action> {
            self.inner.complete(type_of, id, result).await
        }
        async fn give_up(
            &self,
            _type_of: ActionType,
            _id: ActionId,
            _error: serde_json::Value,
        ) -> store::Result<Action> {
            Err(StoreError::InvalidRecord("ledger unavailable".to_string()))
        }
        async fn find_by_id(&self, type_of: ActionType, id: ActionId) -> store::Result<Action> {
            self.inner.find_by_id(type_of, id).await
        }
        async fn find_by_order_number(&self, order_number: &str) -> store::Result<Vec<Action>> {
            self.inner.find_by_order_number(order_number).await
        }
        async fn find_authorize_by_transaction_id(
            &self,
            transaction_id: TransactionId,
        ) -> store::Result<Vec<Action>> {
            self.inner.find_authorize_by_transaction_id(transaction_id).await
        }
    }

    #[tokio::test]
    async fn test_give_up_failure_does_not_mask_original_error() {
        let ledger = ActionLedger::new(Arc::new(BrokenGiveUp {
            inner: InMemoryActionRepository::new(),
        }));

        let err = ledger
            .run(attributes(), || async {
                Err::<(), _>(SagaError::Payment("declined".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Payment(message) if message == "declined"));
    }
}

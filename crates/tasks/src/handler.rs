//! Task handlers and the registry that maps task names to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{TaskData, TaskName};
use saga::OrderService;

use crate::Result;

/// Executes task payloads.
///
/// A handler may be invoked again for a payload it already executed (after a
/// crash or a retry sweep), so every handler must be idempotent.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, data: &TaskData) -> Result<()>;
}

/// Maps task names to handlers.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<TaskName, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every task name routed to the saga services.
    pub fn for_saga(orders: OrderService) -> Self {
        let handler: Arc<dyn TaskHandler> = Arc::new(SagaTaskHandler::new(orders));
        let mut registry = Self::new();
        for name in TaskName::ALL {
            registry.register(name, Arc::clone(&handler));
        }
        registry
    }

    /// Registers a handler, replacing any previous one for the same name.
    pub fn register(&mut self, name: TaskName, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: TaskName) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&name)
    }

    /// Registered names in a stable order.
    pub fn names(&self) -> Vec<TaskName> {
        let mut names: Vec<TaskName> = self.handlers.keys().copied().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Routes every task payload to the order materialization services.
pub struct SagaTaskHandler {
    orders: OrderService,
}

impl SagaTaskHandler {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl TaskHandler for SagaTaskHandler {
    async fn handle(&self, data: &TaskData) -> Result<()> {
        match data {
            TaskData::PlaceOrder { transaction_id } => {
                self.orders.create_from_transaction(*transaction_id).await?;
            }
            TaskData::SendOrder(attributes) => {
                self.orders.send_order(attributes).await?;
            }
            TaskData::PayCreditCard(attributes) | TaskData::PayPecorino(attributes) => {
                self.orders.pay(attributes).await?;
            }
            TaskData::SendEmailMessage(attributes) => {
                self.orders.send_email_message(attributes).await?;
            }
            TaskData::ReturnOrder { transaction_id } => {
                self.orders.return_order(*transaction_id).await?;
            }
            TaskData::RefundCreditCard(attributes) | TaskData::RefundPecorino(attributes) => {
                self.orders.refund(attributes).await?;
            }
            TaskData::CancelSeatReservation { transaction_id } => {
                self.orders.cancel_seat_reservations(*transaction_id).await?;
            }
            TaskData::VoidPayment { transaction_id } => {
                self.orders.void_payments(*transaction_id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use saga::{
        Collaborators, InMemoryMailer, InMemoryPaymentGateway, InMemoryReservationService,
        ReturnWindowPolicy, SagaServices,
    };
    use store::Repositories;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn handle(&self, _data: &TaskData) -> Result<()> {
            Ok(())
        }
    }

    fn saga_services() -> SagaServices {
        let collaborators = Collaborators {
            payments: Arc::new(InMemoryPaymentGateway::new()),
            reservations: Arc::new(InMemoryReservationService::new()),
            mailer: Arc::new(InMemoryMailer::new()),
        };
        SagaServices::new(
            &Repositories::in_memory(),
            &collaborators,
            Arc::new(ReturnWindowPolicy::default()),
        )
    }

    #[test]
    fn test_saga_registry_covers_every_name() {
        let registry = TaskRegistry::for_saga(saga_services().orders);
        assert_eq!(registry.len(), TaskName::ALL.len());
        assert_eq!(registry.names(), TaskName::ALL.to_vec());
    }

    #[test]
    fn test_register_replaces_handler() {
        let mut registry = TaskRegistry::new();
        assert!(registry.is_empty());

        registry.register(TaskName::SendOrder, Arc::new(NoopHandler));
        registry.register(TaskName::SendOrder, Arc::new(NoopHandler));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(TaskName::SendOrder).is_some());
        assert!(registry.get(TaskName::PayPecorino).is_none());
    }
}

//! Saga services for placing and returning orders.
//!
//! A saga transaction is started, accumulates authorizations while
//! InProgress, and is confirmed with a result and a declarative set of
//! potential actions. Confirmation performs no side effects itself: the
//! exporter later turns the finished transaction into tasks, and the task
//! runtime drives the materialization services in [`order`], which may
//! enqueue further tasks of their own.
//!
//! ```text
//! PlaceOrder ──confirm──► PlaceOrder task ──► create order ──► SendOrder / Pay* tasks
//!            ──expire───► CancelSeatReservation + VoidPayment tasks
//! ReturnOrder ─confirm──► ReturnOrder task ──► return order ──► Refund* / email tasks
//! ```

pub mod authorization;
pub mod error;
pub mod export;
pub mod ledger;
pub mod message;
pub mod order;
pub mod place_order;
pub mod return_order;
pub mod services;

use std::sync::Arc;

use domain::Transaction;
use store::Repositories;

pub use authorization::{AuthorizeObject, Authorizations, PaymentAuthorization, SeatAuthorization};
pub use error::{Result, SagaError};
pub use export::{EXPORTABLE, TaskExporter, enqueue_once, tasks_for_transaction};
pub use ledger::ActionLedger;
pub use order::OrderService;
pub use place_order::{
    AuthorizePayment, AuthorizeSeat, ConfirmPlaceOrder, PlaceOrderService, StartPlaceOrder,
};
pub use return_order::{
    ConfirmReturnOrder, ReturnOrderService, ReturnPolicy, ReturnWindowPolicy, StartReturnOrder,
};
pub use services::{
    AuthorizationStatus, InMemoryMailer, InMemoryPaymentGateway, InMemoryReservationService,
    Mailer, PaymentAuthorized, PaymentGateway, ReservationService, ReservationStatus, SeatReserved,
};

/// The external services the sagas call.
#[derive(Clone)]
pub struct Collaborators {
    pub payments: Arc<dyn PaymentGateway>,
    pub reservations: Arc<dyn ReservationService>,
    pub mailer: Arc<dyn Mailer>,
}

/// Every saga service wired to one set of repositories.
#[derive(Clone)]
pub struct SagaServices {
    pub place_order: PlaceOrderService,
    pub return_order: ReturnOrderService,
    pub orders: OrderService,
    pub exporter: TaskExporter,
}

impl SagaServices {
    pub fn new(
        repositories: &Repositories,
        collaborators: &Collaborators,
        return_policy: Arc<dyn ReturnPolicy>,
    ) -> Self {
        let ledger = ActionLedger::new(repositories.actions.clone());
        Self {
            place_order: PlaceOrderService::new(
                repositories.transactions.clone(),
                ledger.clone(),
                collaborators.reservations.clone(),
                collaborators.payments.clone(),
            ),
            return_order: ReturnOrderService::new(
                repositories.transactions.clone(),
                repositories.actions.clone(),
                repositories.orders.clone(),
                return_policy,
            ),
            orders: OrderService::new(repositories, ledger, collaborators),
            exporter: TaskExporter::new(
                repositories.transactions.clone(),
                repositories.tasks.clone(),
            ),
        }
    }
}

/// Fails with `Forbidden` unless `agent_id` started the transaction.
pub(crate) fn ensure_agent(transaction: &Transaction, agent_id: &str) -> Result<()> {
    if transaction.agent.id != agent_id {
        return Err(SagaError::Forbidden(format!(
            "transaction {} does not belong to agent {agent_id}",
            transaction.id
        )));
    }
    Ok(())
}

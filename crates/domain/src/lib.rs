//! Domain layer for the saga and task engine.
//!
//! This crate holds the persisted entity models and their state machines:
//! - `Transaction` sagas (PlaceOrder, ReturnOrder) with typed potential actions
//! - `Action` ledger entries
//! - `Task` deferred work items with a closed set of payloads
//! - `Order` and `OwnershipInfo` records the sagas materialize

pub mod action;
pub mod error;
pub mod order;
pub mod ownership;
pub mod party;
pub mod payment;
pub mod task;
pub mod transaction;

pub use action::{Action, ActionAttributes, ActionPurpose, ActionStatus, ActionType};
pub use common::{ActionId, TaskId, TransactionId};
pub use error::DomainError;
pub use order::{AcceptedOffer, Order, OrderPaymentMethod, OrderStatus};
pub use ownership::{OwnershipInfo, ReservedSeat};
pub use party::{Agent, CustomerContact, EmailAddress, EmailMessage, Seller};
pub use payment::PaymentMethod;
pub use task::{ExecutionResult, Task, TaskAttributes, TaskData, TaskName, TaskStatus};
pub use transaction::{
    OrderActionAttributes, OrderPotentialActions, PaymentActionAttributes, PlaceOrderObject,
    PlaceOrderPotentialActions, PlaceOrderResult, PotentialActions, ReturnOrderActionAttributes,
    ReturnOrderObject, ReturnOrderPotentialActions, ReturnOrderResult, ReturnPotentialActions,
    SendEmailMessageActionAttributes, SendOrderActionAttributes, SendOrderPotentialActions,
    TasksExportationStatus, Transaction, TransactionAttributes, TransactionObject,
    TransactionRef, TransactionResult, TransactionStatus, TransactionType,
};

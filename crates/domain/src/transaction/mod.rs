//! Saga transactions and the typed payloads each saga type carries.

mod place_order;
mod return_order;
mod status;

use chrono::{DateTime, Utc};
use common::{ActionId, TransactionId};
use serde::{Deserialize, Serialize};

pub use place_order::{
    OrderActionAttributes, OrderPotentialActions, PlaceOrderObject, PlaceOrderPotentialActions,
    PlaceOrderResult, SendOrderActionAttributes, SendOrderPotentialActions,
};
pub use return_order::{
    ReturnOrderActionAttributes, ReturnOrderObject, ReturnOrderPotentialActions,
    ReturnOrderResult, ReturnPotentialActions,
};
pub use status::{TasksExportationStatus, TransactionStatus};

use crate::error::DomainError;
use crate::party::{Agent, EmailMessage};
use crate::payment::PaymentMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    PlaceOrder,
    ReturnOrder,
}

impl TransactionType {
    pub const ALL: [TransactionType; 2] = [TransactionType::PlaceOrder, TransactionType::ReturnOrder];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::PlaceOrder => "PlaceOrder",
            TransactionType::ReturnOrder => "ReturnOrder",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PlaceOrder" => Ok(TransactionType::PlaceOrder),
            "ReturnOrder" => Ok(TransactionType::ReturnOrder),
            other => Err(DomainError::unknown("transaction type", other)),
        }
    }
}

/// A reference from one transaction (or action) to another transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub type_of: TransactionType,
    pub id: TransactionId,
}

/// Capturing or refunding one payment authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentActionAttributes {
    pub order_number: String,
    pub authorize_action_id: ActionId,
    pub payment_method: PaymentMethod,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailMessageActionAttributes {
    pub message: EmailMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionObject {
    PlaceOrder(PlaceOrderObject),
    ReturnOrder(ReturnOrderObject),
}

impl TransactionObject {
    pub fn type_of(&self) -> TransactionType {
        match self {
            TransactionObject::PlaceOrder(_) => TransactionType::PlaceOrder,
            TransactionObject::ReturnOrder(_) => TransactionType::ReturnOrder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionResult {
    PlaceOrder(PlaceOrderResult),
    ReturnOrder(ReturnOrderResult),
}

impl TransactionResult {
    pub fn type_of(&self) -> TransactionType {
        match self {
            TransactionResult::PlaceOrder(_) => TransactionType::PlaceOrder,
            TransactionResult::ReturnOrder(_) => TransactionType::ReturnOrder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PotentialActions {
    PlaceOrder(PlaceOrderPotentialActions),
    ReturnOrder(ReturnOrderPotentialActions),
}

impl PotentialActions {
    pub fn type_of(&self) -> TransactionType {
        match self {
            PotentialActions::PlaceOrder(_) => TransactionType::PlaceOrder,
            PotentialActions::ReturnOrder(_) => TransactionType::ReturnOrder,
        }
    }
}

/// Attributes for starting a new transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAttributes {
    pub agent: Agent,
    pub object: TransactionObject,
    pub expires: DateTime<Utc>,
}

/// A saga instance.
///
/// `result` and `potential_actions` are present exactly when the status is
/// `Confirmed`; the store is the only writer of `status` and
/// `tasks_exportation_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub status: TransactionStatus,
    pub agent: Agent,
    pub object: TransactionObject,
    #[serde(default)]
    pub result: Option<TransactionResult>,
    #[serde(default)]
    pub potential_actions: Option<PotentialActions>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub expires: DateTime<Utc>,
    pub tasks_exportation_status: TasksExportationStatus,
    #[serde(default)]
    pub tasks_exported_at: Option<DateTime<Utc>>,
    /// Last time the exportation status changed; drives stuck-export recovery.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a new InProgress transaction.
    pub fn start(attributes: TransactionAttributes, now: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            status: TransactionStatus::InProgress,
            agent: attributes.agent,
            object: attributes.object,
            result: None,
            potential_actions: None,
            start_date: now,
            end_date: None,
            expires: attributes.expires,
            tasks_exportation_status: TasksExportationStatus::Unexported,
            tasks_exported_at: None,
            updated_at: now,
        }
    }

    pub fn type_of(&self) -> TransactionType {
        self.object.type_of()
    }

    pub fn to_ref(&self) -> TransactionRef {
        TransactionRef {
            type_of: self.type_of(),
            id: self.id,
        }
    }

    pub fn place_order_object(&self) -> Option<&PlaceOrderObject> {
        match &self.object {
            TransactionObject::PlaceOrder(object) => Some(object),
            TransactionObject::ReturnOrder(_) => None,
        }
    }

    pub fn return_order_object(&self) -> Option<&ReturnOrderObject> {
        match &self.object {
            TransactionObject::ReturnOrder(object) => Some(object),
            TransactionObject::PlaceOrder(_) => None,
        }
    }

    pub fn place_order_result(&self) -> Option<&PlaceOrderResult> {
        match &self.result {
            Some(TransactionResult::PlaceOrder(result)) => Some(result),
            _ => None,
        }
    }

    pub fn place_order_potential_actions(&self) -> Option<&PlaceOrderPotentialActions> {
        match &self.potential_actions {
            Some(PotentialActions::PlaceOrder(actions)) => Some(actions),
            _ => None,
        }
    }

    pub fn return_order_potential_actions(&self) -> Option<&ReturnOrderPotentialActions> {
        match &self.potential_actions {
            Some(PotentialActions::ReturnOrder(actions)) => Some(actions),
            _ => None,
        }
    }

    /// Returns true once the transaction's expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

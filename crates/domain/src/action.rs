//! Entries of the action ledger.
//!
//! An action is recorded before any side effect happens and is closed exactly
//! once, either as completed (with a result) or failed (with an error). Later
//! steps read completed actions to decide whether an effect already happened.

use chrono::{DateTime, Utc};
use common::{ActionId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::party::Agent;
use crate::transaction::TransactionType;

/// ```text
/// Active ──┬──► Completed
///          └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ActionStatus {
    #[default]
    ActiveActionStatus,
    CompletedActionStatus,
    FailedActionStatus,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::ActiveActionStatus)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::ActiveActionStatus => "ActiveActionStatus",
            ActionStatus::CompletedActionStatus => "CompletedActionStatus",
            ActionStatus::FailedActionStatus => "FailedActionStatus",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ActiveActionStatus" => Ok(ActionStatus::ActiveActionStatus),
            "CompletedActionStatus" => Ok(ActionStatus::CompletedActionStatus),
            "FailedActionStatus" => Ok(ActionStatus::FailedActionStatus),
            other => Err(DomainError::unknown("action status", other)),
        }
    }
}

/// Kinds of business operations recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Seat or payment authorization inside a PlaceOrder transaction.
    AuthorizeAction,
    /// Creating an order from a confirmed transaction.
    OrderAction,
    /// Delivering an order or sending a message.
    SendAction,
    PayAction,
    RefundAction,
    ReturnAction,
    /// Releasing an authorization of an abandoned transaction.
    CancelAction,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AuthorizeAction => "AuthorizeAction",
            ActionType::OrderAction => "OrderAction",
            ActionType::SendAction => "SendAction",
            ActionType::PayAction => "PayAction",
            ActionType::RefundAction => "RefundAction",
            ActionType::ReturnAction => "ReturnAction",
            ActionType::CancelAction => "CancelAction",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AuthorizeAction" => Ok(ActionType::AuthorizeAction),
            "OrderAction" => Ok(ActionType::OrderAction),
            "SendAction" => Ok(ActionType::SendAction),
            "PayAction" => Ok(ActionType::PayAction),
            "RefundAction" => Ok(ActionType::RefundAction),
            "ReturnAction" => Ok(ActionType::ReturnAction),
            "CancelAction" => Ok(ActionType::CancelAction),
            other => Err(DomainError::unknown("action type", other)),
        }
    }
}

/// Why an action was performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type_of")]
pub enum ActionPurpose {
    Transaction {
        transaction_type: TransactionType,
        id: TransactionId,
    },
    Order {
        order_number: String,
    },
}

impl ActionPurpose {
    pub fn transaction(transaction_type: TransactionType, id: TransactionId) -> Self {
        ActionPurpose::Transaction {
            transaction_type,
            id,
        }
    }

    pub fn order(order_number: impl Into<String>) -> Self {
        ActionPurpose::Order {
            order_number: order_number.into(),
        }
    }
}

/// Attributes for starting an action.
///
/// `object` is free-form JSON; by convention an object about an order carries
/// an `order_number` field so the ledger can be searched by order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAttributes {
    pub type_of: ActionType,
    pub agent: Agent,
    pub object: serde_json::Value,
    #[serde(default)]
    pub purpose: Option<ActionPurpose>,
}

impl ActionAttributes {
    pub fn new(type_of: ActionType, agent: Agent, object: serde_json::Value) -> Self {
        Self {
            type_of,
            agent,
            object,
            purpose: None,
        }
    }

    pub fn with_purpose(mut self, purpose: ActionPurpose) -> Self {
        self.purpose = Some(purpose);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub type_of: ActionType,
    pub agent: Agent,
    pub object: serde_json::Value,
    #[serde(default)]
    pub purpose: Option<ActionPurpose>,
    pub action_status: ActionStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl Action {
    /// Builds a new active action.
    pub fn start(attributes: ActionAttributes, now: DateTime<Utc>) -> Self {
        Self {
            id: ActionId::new(),
            type_of: attributes.type_of,
            agent: attributes.agent,
            object: attributes.object,
            purpose: attributes.purpose,
            action_status: ActionStatus::ActiveActionStatus,
            result: None,
            error: None,
            start_date: now,
            end_date: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.action_status == ActionStatus::CompletedActionStatus
    }

    /// The order number this action concerns, from its object or its purpose.
    pub fn order_number(&self) -> Option<&str> {
        if let Some(number) = self.object.get("order_number").and_then(|v| v.as_str()) {
            return Some(number);
        }
        match &self.purpose {
            Some(ActionPurpose::Order { order_number }) => Some(order_number),
            _ => None,
        }
    }

    /// The transaction this action was performed for, if any.
    pub fn purpose_transaction_id(&self) -> Option<TransactionId> {
        match &self.purpose {
            Some(ActionPurpose::Transaction { id, .. }) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_is_active() {
        let action = Action::start(
            ActionAttributes::new(
                ActionType::OrderAction,
                Agent::system(),
                json!({"order_number": "20250101-ABC"}),
            ),
            Utc::now(),
        );
        assert_eq!(action.action_status, ActionStatus::ActiveActionStatus);
        assert!(!action.action_status.is_terminal());
        assert!(action.end_date.is_none());
        assert_eq!(action.order_number(), Some("20250101-ABC"));
    }

    #[test]
    fn test_order_number_falls_back_to_purpose() {
        let action = Action::start(
            ActionAttributes::new(ActionType::PayAction, Agent::system(), json!({}))
                .with_purpose(ActionPurpose::order("20250101-XYZ")),
            Utc::now(),
        );
        assert_eq!(action.order_number(), Some("20250101-XYZ"));
        assert!(action.purpose_transaction_id().is_none());
    }

    #[test]
    fn test_purpose_serializes_with_tag() {
        let id = TransactionId::new();
        let purpose = ActionPurpose::transaction(TransactionType::PlaceOrder, id);
        let value = serde_json::to_value(&purpose).unwrap();
        assert_eq!(value["type_of"], "Transaction");
        assert_eq!(value["id"], id.to_string());
    }
}

//! Deferred work items.
//!
//! The set of task kinds is closed: every payload is a variant of `TaskData`
//! and its `TaskName` is derived from the variant, so a task can never carry a
//! payload that does not match its name.

use chrono::{DateTime, Utc};
use common::{TaskId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::transaction::{
    PaymentActionAttributes, SendEmailMessageActionAttributes, SendOrderActionAttributes,
};

/// ```text
/// Ready ──► Running ──┬──► Executed
///   ▲                 ├──► Aborted      (tries exhausted, abort sweep)
///   └─────────────────┘                 (retry sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    Ready,
    Running,
    Executed,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Executed | TaskStatus::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "Ready",
            TaskStatus::Running => "Running",
            TaskStatus::Executed => "Executed",
            TaskStatus::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ready" => Ok(TaskStatus::Ready),
            "Running" => Ok(TaskStatus::Running),
            "Executed" => Ok(TaskStatus::Executed),
            "Aborted" => Ok(TaskStatus::Aborted),
            other => Err(DomainError::unknown("task status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskName {
    PlaceOrder,
    SendOrder,
    PayCreditCard,
    PayPecorino,
    SendEmailMessage,
    ReturnOrder,
    RefundCreditCard,
    RefundPecorino,
    CancelSeatReservation,
    VoidPayment,
}

impl TaskName {
    pub const ALL: [TaskName; 10] = [
        TaskName::PlaceOrder,
        TaskName::SendOrder,
        TaskName::PayCreditCard,
        TaskName::PayPecorino,
        TaskName::SendEmailMessage,
        TaskName::ReturnOrder,
        TaskName::RefundCreditCard,
        TaskName::RefundPecorino,
        TaskName::CancelSeatReservation,
        TaskName::VoidPayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::PlaceOrder => "PlaceOrder",
            TaskName::SendOrder => "SendOrder",
            TaskName::PayCreditCard => "PayCreditCard",
            TaskName::PayPecorino => "PayPecorino",
            TaskName::SendEmailMessage => "SendEmailMessage",
            TaskName::ReturnOrder => "ReturnOrder",
            TaskName::RefundCreditCard => "RefundCreditCard",
            TaskName::RefundPecorino => "RefundPecorino",
            TaskName::CancelSeatReservation => "CancelSeatReservation",
            TaskName::VoidPayment => "VoidPayment",
        }
    }

    /// How many times a task of this kind is retried before it is aborted.
    pub fn default_number_of_tries(&self) -> u32 {
        match self {
            TaskName::SendEmailMessage => 3,
            _ => 10,
        }
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DomainError::unknown("task name", s))
    }
}

/// The payload of a task, one variant per task kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum TaskData {
    /// Create the order of a confirmed PlaceOrder transaction.
    PlaceOrder { transaction_id: TransactionId },
    SendOrder(SendOrderActionAttributes),
    PayCreditCard(PaymentActionAttributes),
    PayPecorino(PaymentActionAttributes),
    SendEmailMessage(SendEmailMessageActionAttributes),
    /// Return the order of a confirmed ReturnOrder transaction.
    ReturnOrder { transaction_id: TransactionId },
    RefundCreditCard(PaymentActionAttributes),
    RefundPecorino(PaymentActionAttributes),
    /// Release seat authorizations of an expired or canceled PlaceOrder.
    CancelSeatReservation { transaction_id: TransactionId },
    /// Void payment authorizations of an expired or canceled PlaceOrder.
    VoidPayment { transaction_id: TransactionId },
}

impl TaskData {
    pub fn name(&self) -> TaskName {
        match self {
            TaskData::PlaceOrder { .. } => TaskName::PlaceOrder,
            TaskData::SendOrder(_) => TaskName::SendOrder,
            TaskData::PayCreditCard(_) => TaskName::PayCreditCard,
            TaskData::PayPecorino(_) => TaskName::PayPecorino,
            TaskData::SendEmailMessage(_) => TaskName::SendEmailMessage,
            TaskData::ReturnOrder { .. } => TaskName::ReturnOrder,
            TaskData::RefundCreditCard(_) => TaskName::RefundCreditCard,
            TaskData::RefundPecorino(_) => TaskName::RefundPecorino,
            TaskData::CancelSeatReservation { .. } => TaskName::CancelSeatReservation,
            TaskData::VoidPayment { .. } => TaskName::VoidPayment,
        }
    }

    /// The logical unit of work this payload refers to.
    ///
    /// Two tasks with the same name and key describe the same work; enqueueing
    /// checks this key to avoid inserting duplicates.
    pub fn key(&self) -> String {
        match self {
            TaskData::PlaceOrder { transaction_id }
            | TaskData::ReturnOrder { transaction_id }
            | TaskData::CancelSeatReservation { transaction_id }
            | TaskData::VoidPayment { transaction_id } => transaction_id.to_string(),
            TaskData::SendOrder(attributes) => attributes.order_number.clone(),
            TaskData::PayCreditCard(attributes)
            | TaskData::PayPecorino(attributes)
            | TaskData::RefundCreditCard(attributes)
            | TaskData::RefundPecorino(attributes) => attributes.authorize_action_id.to_string(),
            TaskData::SendEmailMessage(attributes) => attributes.message.identifier.clone(),
        }
    }
}

/// One attempt at running a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub executed_at: DateTime<Utc>,
    /// `None` on success.
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(executed_at: DateTime<Utc>) -> Self {
        Self {
            executed_at,
            error: None,
        }
    }

    pub fn failure(executed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            executed_at,
            error: Some(error.into()),
        }
    }
}

/// Attributes for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttributes {
    pub data: TaskData,
    pub runs_at: DateTime<Utc>,
    pub remaining_number_of_tries: u32,
}

impl TaskAttributes {
    /// A task that should run as soon as possible with the default retry budget.
    pub fn asap(data: TaskData, now: DateTime<Utc>) -> Self {
        let remaining_number_of_tries = data.name().default_number_of_tries();
        Self {
            data,
            runs_at: now,
            remaining_number_of_tries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub data: TaskData,
    pub status: TaskStatus,
    pub runs_at: DateTime<Utc>,
    pub remaining_number_of_tries: u32,
    #[serde(default)]
    pub last_tried_at: Option<DateTime<Utc>>,
    pub number_of_tried: u32,
    #[serde(default)]
    pub execution_results: Vec<ExecutionResult>,
}

impl Task {
    /// Builds a new Ready task.
    pub fn new(attributes: TaskAttributes) -> Self {
        Self {
            id: TaskId::new(),
            data: attributes.data,
            status: TaskStatus::Ready,
            runs_at: attributes.runs_at,
            remaining_number_of_tries: attributes.remaining_number_of_tries,
            last_tried_at: None,
            number_of_tried: 0,
            execution_results: Vec::new(),
        }
    }

    pub fn name(&self) -> TaskName {
        self.data.name()
    }

    /// Returns true if the retry budget is used up.
    pub fn tries_exhausted(&self) -> bool {
        self.number_of_tried >= self.remaining_number_of_tries
    }

    /// The error of the most recent execution attempt, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.execution_results
            .last()
            .and_then(|result| result.error.as_deref())
    }
}

//! Participants of a transaction and contact details.

use serde::{Deserialize, Serialize};

/// The actor driving a transaction or an action (customer, administrator, system).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The agent used for work performed by the engine itself (task handlers).
    pub fn system() -> Self {
        Self::new("system").with_name("Task runtime")
    }
}

/// The organization selling the goods of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Contact details the customer supplies during a PlaceOrder transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub telephone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: String,
    pub email: String,
}

/// A fully rendered email notification.
///
/// `identifier` is stable for a given logical notification and doubles as the
/// idempotency key of the task that sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub identifier: String,
    pub sender: EmailAddress,
    pub to_recipient: EmailAddress,
    pub about: String,
    pub text: String,
}

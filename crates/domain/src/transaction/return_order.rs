//! ReturnOrder transaction payloads.

use serde::{Deserialize, Serialize};

use super::{PaymentActionAttributes, SendEmailMessageActionAttributes, TransactionRef};
use crate::party::Agent;

/// What a ReturnOrder transaction is about.
///
/// `transaction` references the PlaceOrder transaction that produced the
/// order; at most one ReturnOrder may exist per referenced transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnOrderObject {
    pub transaction: TransactionRef,
    pub order_number: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set when an administrator bypassed the return policy.
    #[serde(default)]
    pub forcibly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnOrderResult {
    pub order_number: String,
    /// Sum of the amounts that will be refunded.
    pub refund_total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnOrderPotentialActions {
    pub return_order: ReturnOrderActionAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnOrderActionAttributes {
    pub agent: Agent,
    pub order_number: String,
    pub potential_actions: ReturnPotentialActions,
}

/// Work declared to follow a completed return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnPotentialActions {
    #[serde(default)]
    pub refund_credit_card: Option<PaymentActionAttributes>,
    #[serde(default)]
    pub refund_pecorino: Option<PaymentActionAttributes>,
    #[serde(default)]
    pub send_email_message: Option<SendEmailMessageActionAttributes>,
}

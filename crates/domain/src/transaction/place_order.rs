//! PlaceOrder transaction payloads.

use serde::{Deserialize, Serialize};

use super::{PaymentActionAttributes, SendEmailMessageActionAttributes};
use crate::order::Order;
use crate::party::{Agent, CustomerContact, Seller};

/// What a PlaceOrder transaction is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderObject {
    pub seller: Seller,
    #[serde(default)]
    pub customer_contact: Option<CustomerContact>,
    /// Set when confirmation skipped request validation.
    #[serde(default)]
    pub forcibly_confirmed: bool,
}

impl PlaceOrderObject {
    pub fn new(seller: Seller) -> Self {
        Self {
            seller,
            customer_contact: None,
            forcibly_confirmed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderResult {
    pub order: Order,
}

/// Everything that must eventually happen after a PlaceOrder confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderPotentialActions {
    pub order: OrderActionAttributes,
}

/// Materializing the order itself; its own potential actions run afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderActionAttributes {
    pub agent: Agent,
    pub order_number: String,
    pub potential_actions: OrderPotentialActions,
}

/// Follow-up work declared on a created order. Each present field becomes
/// exactly one task; absent fields produce nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPotentialActions {
    #[serde(default)]
    pub send_order: Option<SendOrderActionAttributes>,
    #[serde(default)]
    pub pay_credit_card: Option<PaymentActionAttributes>,
    #[serde(default)]
    pub pay_pecorino: Option<PaymentActionAttributes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOrderActionAttributes {
    pub order_number: String,
    #[serde(default)]
    pub potential_actions: SendOrderPotentialActions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOrderPotentialActions {
    #[serde(default)]
    pub send_email_message: Option<SendEmailMessageActionAttributes>,
}

//! Orders materialized from confirmed PlaceOrder transactions.

use chrono::{DateTime, Utc};
use common::{ActionId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::party::{Agent, CustomerContact, Seller};
use crate::payment::PaymentMethod;

/// The delivery lifecycle of an order.
///
/// State transitions:
/// ```text
/// Processing ─┬──► PaymentDue ─────┐
///             ├──► PickupAvailable ┼──► Delivered ──► Returned
///             └──► InTransit ──────┘        ▲
///                                           │ (PickupAvailable may also be returned)
/// Processing | PaymentDue ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Processing,
    PaymentDue,
    PickupAvailable,
    InTransit,
    Delivered,
    Returned,
    Cancelled,
    Problem,
}

impl OrderStatus {
    /// Statuses from which delivery may still move the order to Delivered.
    pub const DELIVERABLE: [OrderStatus; 4] = [
        OrderStatus::Processing,
        OrderStatus::PaymentDue,
        OrderStatus::PickupAvailable,
        OrderStatus::InTransit,
    ];

    /// Statuses from which a return may be started.
    pub const RETURNABLE: [OrderStatus; 2] =
        [OrderStatus::Delivered, OrderStatus::PickupAvailable];

    pub fn can_deliver(&self) -> bool {
        Self::DELIVERABLE.contains(self)
    }

    pub fn is_returnable(&self) -> bool {
        Self::RETURNABLE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::PaymentDue => "PaymentDue",
            OrderStatus::PickupAvailable => "PickupAvailable",
            OrderStatus::InTransit => "InTransit",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Returned => "Returned",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Problem => "Problem",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(OrderStatus::Processing),
            "PaymentDue" => Ok(OrderStatus::PaymentDue),
            "PickupAvailable" => Ok(OrderStatus::PickupAvailable),
            "InTransit" => Ok(OrderStatus::InTransit),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Returned" => Ok(OrderStatus::Returned),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            "Problem" => Ok(OrderStatus::Problem),
            other => Err(DomainError::unknown("order status", other)),
        }
    }
}

/// One reserved seat sold with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedOffer {
    pub reservation_id: String,
    pub event_id: String,
    pub seat_number: String,
    pub price: i64,
}

/// A payment authorization backing the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentMethod {
    pub payment_method: PaymentMethod,
    pub authorize_action_id: ActionId,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_number: String,
    /// The PlaceOrder transaction this order was derived from.
    pub transaction_id: TransactionId,
    pub customer: Agent,
    pub customer_contact: CustomerContact,
    pub seller: Seller,
    pub accepted_offers: Vec<AcceptedOffer>,
    pub payment_methods: Vec<OrderPaymentMethod>,
    pub price: i64,
    pub order_status: OrderStatus,
    pub order_date: DateTime<Utc>,
}

impl Order {
    /// Derives the order number of a PlaceOrder transaction.
    ///
    /// Deterministic so that re-confirming or re-materializing the same
    /// transaction always yields the same order.
    pub fn number_for(transaction_id: TransactionId, order_date: DateTime<Utc>) -> String {
        let simple = transaction_id.as_uuid().simple().to_string();
        format!(
            "{}-{}",
            order_date.format("%Y%m%d"),
            simple[..12].to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returnable_statuses() {
        assert!(OrderStatus::Delivered.is_returnable());
        assert!(OrderStatus::PickupAvailable.is_returnable());
        assert!(!OrderStatus::Processing.is_returnable());
        assert!(!OrderStatus::PaymentDue.is_returnable());
        assert!(!OrderStatus::Returned.is_returnable());
        assert!(!OrderStatus::Cancelled.is_returnable());
    }

    #[test]
    fn test_deliverable_statuses() {
        assert!(OrderStatus::Processing.can_deliver());
        assert!(OrderStatus::PickupAvailable.can_deliver());
        assert!(!OrderStatus::Delivered.can_deliver());
        assert!(!OrderStatus::Returned.can_deliver());
    }

    #[test]
    fn test_order_number_is_deterministic() {
        let tx = TransactionId::new();
        let date = Utc::now();
        let first = Order::number_for(tx, date);
        assert_eq!(first, Order::number_for(tx, date));
        assert_ne!(first, Order::number_for(TransactionId::new(), date));
        assert_eq!(first.len(), 8 + 1 + 12);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Delivered".parse::<OrderStatus>(), Ok(OrderStatus::Delivered));
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }
}

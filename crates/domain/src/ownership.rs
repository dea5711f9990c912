//! Ownership grants created when an order is delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{AcceptedOffer, Order};
use crate::party::{Agent, Seller};

/// The good an ownership grant is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedSeat {
    pub reservation_id: String,
    pub event_id: String,
    pub seat_number: String,
}

/// A customer's right to a reserved seat.
///
/// A grant is valid while `owned_through` is unset or in the future; returning
/// the order invalidates it by setting `owned_through`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipInfo {
    /// `<order number>-<reservation id>`; stable across re-delivery.
    pub identifier: String,
    pub order_number: String,
    pub owned_by: Agent,
    pub acquired_from: Seller,
    pub type_of_good: ReservedSeat,
    pub owned_from: DateTime<Utc>,
    #[serde(default)]
    pub owned_through: Option<DateTime<Utc>>,
}

impl OwnershipInfo {
    /// Builds the grant for one accepted offer of a delivered order.
    pub fn for_offer(order: &Order, offer: &AcceptedOffer, owned_from: DateTime<Utc>) -> Self {
        Self {
            identifier: format!("{}-{}", order.order_number, offer.reservation_id),
            order_number: order.order_number.clone(),
            owned_by: order.customer.clone(),
            acquired_from: order.seller.clone(),
            type_of_good: ReservedSeat {
                reservation_id: offer.reservation_id.clone(),
                event_id: offer.event_id.clone(),
                seat_number: offer.seat_number.clone(),
            },
            owned_from,
            owned_through: None,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.owned_from <= now && self.owned_through.is_none_or(|through| now < through)
    }
}

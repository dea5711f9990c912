//! Typed views of the AuthorizeAction entries of a PlaceOrder transaction.
//!
//! Authorizations are recorded in the action ledger with a JSON object and
//! result; later steps (confirm, cancel, void, pay, refund) read them back
//! through these types.

use common::ActionId;
use domain::{Action, ActionType, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};
use crate::services::{PaymentAuthorized, SeatReserved};

/// The `object` of an AuthorizeAction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type_of")]
pub enum AuthorizeObject {
    SeatReservation {
        event_id: String,
        seat_number: String,
        price: i64,
    },
    Payment {
        payment_method: PaymentMethod,
        amount: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatAuthorization {
    pub action_id: ActionId,
    pub event_id: String,
    pub seat_number: String,
    pub price: i64,
    pub reservation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuthorization {
    pub action_id: ActionId,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub authorization_id: String,
}

/// The completed authorizations of one transaction.
#[derive(Debug, Clone, Default)]
pub struct Authorizations {
    pub seats: Vec<SeatAuthorization>,
    pub payments: Vec<PaymentAuthorization>,
}

impl Authorizations {
    /// Collects completed AuthorizeActions; active and failed ones are skipped.
    pub fn from_actions(actions: &[Action]) -> Result<Self> {
        let mut authorizations = Self::default();

        for action in actions
            .iter()
            .filter(|a| a.type_of == ActionType::AuthorizeAction && a.is_completed())
        {
            let result = action.result.clone().ok_or_else(|| {
                SagaError::argument(format!("authorization {} has no result", action.id))
            })?;

            match serde_json::from_value(action.object.clone())? {
                AuthorizeObject::SeatReservation {
                    event_id,
                    seat_number,
                    price,
                } => {
                    let reserved: SeatReserved = serde_json::from_value(result)?;
                    authorizations.seats.push(SeatAuthorization {
                        action_id: action.id,
                        event_id,
                        seat_number,
                        price,
                        reservation_id: reserved.reservation_id,
                    });
                }
                AuthorizeObject::Payment {
                    payment_method,
                    amount,
                } => {
                    let authorized: PaymentAuthorized = serde_json::from_value(result)?;
                    authorizations.payments.push(PaymentAuthorization {
                        action_id: action.id,
                        payment_method,
                        amount,
                        authorization_id: authorized.authorization_id,
                    });
                }
            }
        }

        Ok(authorizations)
    }

    /// Sum of the reserved seat prices; `Argument` if it overflows.
    pub fn seat_total(&self) -> Result<i64> {
        checked_total("seat", self.seats.iter().map(|s| s.price))
    }

    /// Sum of the authorized payment amounts; `Argument` if it overflows.
    pub fn payment_total(&self) -> Result<i64> {
        checked_total("payment", self.payments.iter().map(|p| p.amount))
    }

    pub fn payment(&self, method: PaymentMethod) -> Option<&PaymentAuthorization> {
        self.payments.iter().find(|p| p.payment_method == method)
    }

    pub fn payment_by_action(&self, action_id: ActionId) -> Option<&PaymentAuthorization> {
        self.payments.iter().find(|p| p.action_id == action_id)
    }
}

fn checked_total(what: &str, mut amounts: impl Iterator<Item = i64>) -> Result<i64> {
    amounts
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| SagaError::argument(format!("{what} total is out of range")))
}

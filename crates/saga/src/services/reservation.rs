//! Seat reservation service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{read, write};
use crate::error::SagaError;

/// Result of a successful seat reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatReserved {
    /// The reservation ID assigned by the reservation service.
    pub reservation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Held,
    Confirmed,
    Canceled,
}

/// Trait for seat reservation operations.
#[async_trait]
pub trait ReservationService: Send + Sync {
    /// Holds a seat of an event.
    async fn reserve(&self, event_id: &str, seat_number: &str) -> Result<SeatReserved, SagaError>;

    /// Turns a hold into a sold seat. Confirming twice succeeds.
    async fn confirm(&self, reservation_id: &str) -> Result<(), SagaError>;

    /// Releases a hold or a sold seat. Canceling twice succeeds.
    async fn cancel(&self, reservation_id: &str) -> Result<(), SagaError>;
}

#[derive(Debug)]
struct Reservation {
    event_id: String,
    seat_number: String,
    status: ReservationStatus,
}

#[derive(Debug, Default)]
struct InMemoryReservationState {
    reservations: HashMap<String, Reservation>,
    next_id: u32,
    fail_on_reserve: bool,
    fail_on_cancel: bool,
}

/// In-memory reservation service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationService {
    state: Arc<RwLock<InMemoryReservationState>>,
}

impl InMemoryReservationService {
    /// Creates a new in-memory reservation service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on reserve calls.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        write(&self.state).fail_on_reserve = fail;
    }

    /// Configures the service to fail on cancel calls.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        write(&self.state).fail_on_cancel = fail;
    }

    pub fn status_of(&self, reservation_id: &str) -> Option<ReservationStatus> {
        read(&self.state)
            .reservations
            .get(reservation_id)
            .map(|r| r.status)
    }

    /// Returns the number of reservations in the given status.
    pub fn count_in(&self, status: ReservationStatus) -> usize {
        read(&self.state)
            .reservations
            .values()
            .filter(|r| r.status == status)
            .count()
    }
}

#[async_trait]
impl ReservationService for InMemoryReservationService {
    async fn reserve(&self, event_id: &str, seat_number: &str) -> Result<SeatReserved, SagaError> {
        let mut state = write(&self.state);

        if state.fail_on_reserve {
            return Err(SagaError::Reservation("Seat unavailable".to_string()));
        }
        let taken = state.reservations.values().any(|r| {
            r.event_id == event_id
                && r.seat_number == seat_number
                && r.status != ReservationStatus::Canceled
        });
        if taken {
            return Err(SagaError::Reservation(format!(
                "seat {seat_number} of {event_id} is already reserved"
            )));
        }

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state.reservations.insert(
            reservation_id.clone(),
            Reservation {
                event_id: event_id.to_string(),
                seat_number: seat_number.to_string(),
                status: ReservationStatus::Held,
            },
        );

        Ok(SeatReserved { reservation_id })
    }

    async fn confirm(&self, reservation_id: &str) -> Result<(), SagaError> {
        let mut state = write(&self.state);
        let reservation = state
            .reservations
            .get_mut(reservation_id)
            .ok_or_else(|| SagaError::Reservation(format!("unknown reservation {reservation_id}")))?;

        match reservation.status {
            ReservationStatus::Canceled => Err(SagaError::Reservation(format!(
                "reservation {reservation_id} was canceled"
            ))),
            _ => {
                reservation.status = ReservationStatus::Confirmed;
                Ok(())
            }
        }
    }

    async fn cancel(&self, reservation_id: &str) -> Result<(), SagaError> {
        let mut state = write(&self.state);
        if state.fail_on_cancel {
            return Err(SagaError::Reservation("Cancel failed".to_string()));
        }
        let reservation = state
            .reservations
            .get_mut(reservation_id)
            .ok_or_else(|| SagaError::Reservation(format!("unknown reservation {reservation_id}")))?;
        reservation.status = ReservationStatus::Canceled;
        Ok(())
    }
}

//! External collaborators the saga services call, with in-memory doubles.

pub mod mailer;
pub mod payment;
pub mod reservation;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use mailer::{InMemoryMailer, Mailer};
pub use payment::{
    AuthorizationStatus, InMemoryPaymentGateway, PaymentAuthorized, PaymentGateway,
};
pub use reservation::{
    InMemoryReservationService, ReservationService, ReservationStatus, SeatReserved,
};

// The doubles never hold a guard across an await, so a poisoned lock only
// means a test panicked mid-update; the state is still usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::PaymentMethod;
use serde::{Deserialize, Serialize};

use super::{read, write};
use crate::error::SagaError;

/// Result of a successful payment authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorized {
    /// The authorization ID assigned by the gateway.
    pub authorization_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Captured,
    Voided,
    Refunded,
}

/// Trait for payment gateway operations.
///
/// Capturing, voiding and refunding an authorization that is already in the
/// target state succeeds, so retried tasks do not double-charge.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Places a hold for `amount` with the given payment method.
    async fn authorize(
        &self,
        payment_method: PaymentMethod,
        amount: i64,
        reference: &str,
    ) -> Result<PaymentAuthorized, SagaError>;

    /// Collects a held amount.
    async fn capture(&self, authorization_id: &str) -> Result<(), SagaError>;

    /// Releases a hold that was never captured.
    async fn void(&self, authorization_id: &str) -> Result<(), SagaError>;

    /// Returns a captured amount to the customer.
    async fn refund(&self, authorization_id: &str, amount: i64) -> Result<(), SagaError>;
}

#[derive(Debug)]
struct Authorization {
    amount: i64,
    status: AuthorizationStatus,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    authorizations: HashMap<String, Authorization>,
    next_id: u32,
    fail_on_authorize: bool,
    fail_on_capture: bool,
    fail_on_refund: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline authorizations.
    pub fn set_fail_on_authorize(&self, fail: bool) {
        write(&self.state).fail_on_authorize = fail;
    }

    /// Configures the gateway to fail captures.
    pub fn set_fail_on_capture(&self, fail: bool) {
        write(&self.state).fail_on_capture = fail;
    }

    /// Configures the gateway to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        write(&self.state).fail_on_refund = fail;
    }

    pub fn status_of(&self, authorization_id: &str) -> Option<AuthorizationStatus> {
        read(&self.state)
            .authorizations
            .get(authorization_id)
            .map(|a| a.status)
    }

    /// Returns the number of authorizations in the given status.
    pub fn count_in(&self, status: AuthorizationStatus) -> usize {
        read(&self.state)
            .authorizations
            .values()
            .filter(|a| a.status == status)
            .count()
    }

    fn transition(
        &self,
        authorization_id: &str,
        from: AuthorizationStatus,
        to: AuthorizationStatus,
    ) -> Result<(), SagaError> {
        let mut state = write(&self.state);
        let authorization = state
            .authorizations
            .get_mut(authorization_id)
            .ok_or_else(|| SagaError::Payment(format!("unknown authorization {authorization_id}")))?;

        if authorization.status == to {
            return Ok(());
        }
        if authorization.status != from {
            return Err(SagaError::Payment(format!(
                "authorization {authorization_id} is {:?}, expected {:?}",
                authorization.status, from
            )));
        }
        authorization.status = to;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(
        &self,
        payment_method: PaymentMethod,
        amount: i64,
        _reference: &str,
    ) -> Result<PaymentAuthorized, SagaError> {
        let mut state = write(&self.state);

        if state.fail_on_authorize {
            return Err(SagaError::Payment("Payment declined".to_string()));
        }
        if amount <= 0 {
            return Err(SagaError::Payment(format!("invalid amount {amount}")));
        }

        state.next_id += 1;
        let prefix = match payment_method {
            PaymentMethod::CreditCard => "CC",
            PaymentMethod::Pecorino => "PEC",
        };
        let authorization_id = format!("{prefix}-{:04}", state.next_id);
        state.authorizations.insert(
            authorization_id.clone(),
            Authorization {
                amount,
                status: AuthorizationStatus::Authorized,
            },
        );

        Ok(PaymentAuthorized { authorization_id })
    }

    async fn capture(&self, authorization_id: &str) -> Result<(), SagaError> {
        if read(&self.state).fail_on_capture {
            return Err(SagaError::Payment("Capture failed".to_string()));
        }
        self.transition(
            authorization_id,
            AuthorizationStatus::Authorized,
            AuthorizationStatus::Captured,
        )
    }

    async fn void(&self, authorization_id: &str) -> Result<(), SagaError> {
        self.transition(
            authorization_id,
            AuthorizationStatus::Authorized,
            AuthorizationStatus::Voided,
        )
    }

    async fn refund(&self, authorization_id: &str, amount: i64) -> Result<(), SagaError> {
        if read(&self.state).fail_on_refund {
            return Err(SagaError::Payment("Refund failed".to_string()));
        }
        {
            let state = read(&self.state);
            if let Some(authorization) = state.authorizations.get(authorization_id)
                && amount > authorization.amount
            {
                return Err(SagaError::Payment(format!(
                    "refund {amount} exceeds captured {}",
                    authorization.amount
                )));
            }
        }
        self.transition(
            authorization_id,
            AuthorizationStatus::Captured,
            AuthorizationStatus::Refunded,
        )
    }
}

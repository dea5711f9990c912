//! Saga error types.

use store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A referenced entity is absent, or not in the state the operation needs.
    #[error("{entity} not found: {criteria}")]
    NotFound {
        entity: &'static str,
        criteria: String,
    },

    /// A precondition was violated by caller-supplied data.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// A uniqueness constraint rejected the operation.
    #[error("{entity} already in use: {reason}")]
    AlreadyInUse {
        entity: &'static str,
        reason: String,
    },

    /// The acting agent does not own the transaction.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No behavior is defined for this combination.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Payment(String),

    /// Seat reservation service error.
    #[error("Reservation service error: {0}")]
    Reservation(String),

    /// Mail delivery error.
    #[error("Mailer error: {0}")]
    Mailer(String),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    pub fn not_found(entity: &'static str, criteria: impl Into<String>) -> Self {
        SagaError::NotFound {
            entity,
            criteria: criteria.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        SagaError::Argument(message.into())
    }
}

impl From<StoreError> for SagaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, criteria } => SagaError::NotFound { entity, criteria },
            StoreError::AlreadyInUse { entity, reason } => SagaError::AlreadyInUse { entity, reason },
            StoreError::Argument(message) => SagaError::Argument(message),
            other => SagaError::Store(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

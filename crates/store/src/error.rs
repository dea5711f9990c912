use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matched, or the matching record was not in the required state.
    #[error("{entity} not found: {criteria}")]
    NotFound {
        entity: &'static str,
        criteria: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("{entity} already in use: {reason}")]
    AlreadyInUse {
        entity: &'static str,
        reason: String,
    },

    /// The caller supplied data the operation cannot accept.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// A stored row could not be interpreted.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, criteria: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            criteria: criteria.into(),
        }
    }

    pub fn already_in_use(entity: &'static str, reason: impl Into<String>) -> Self {
        StoreError::AlreadyInUse {
            entity,
            reason: reason.into(),
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::InvalidRecord(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Task runtime error types.

use thiserror::Error;

/// Errors that can occur while running tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task store failed; the runtime cannot make progress.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// A handler failed to execute its payload.
    #[error("Handler error: {0}")]
    Handler(#[from] saga::SagaError),

    /// An operator alert could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),
}

/// Result type for task runtime operations.
pub type Result<T> = std::result::Result<T, TaskError>;

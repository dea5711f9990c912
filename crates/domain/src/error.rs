//! Domain error types.

use thiserror::Error;

/// Errors raised while interpreting persisted domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A stored enum value did not match any known variant.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

impl DomainError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        DomainError::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}

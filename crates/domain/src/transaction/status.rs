//! Transaction lifecycle and task exportation state machines.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a saga transaction.
///
/// State transitions:
/// ```text
/// InProgress ──┬──► Confirmed
///              ├──► Expired
///              └──► Canceled
/// ```
/// Every transition happens exactly once; the three outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionStatus {
    #[default]
    InProgress,
    Confirmed,
    Expired,
    Canceled,
}

impl TransactionStatus {
    /// Returns true if the transaction may still be confirmed, expired or canceled.
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::InProgress)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::InProgress => "InProgress",
            TransactionStatus::Confirmed => "Confirmed",
            TransactionStatus::Expired => "Expired",
            TransactionStatus::Canceled => "Canceled",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InProgress" => Ok(TransactionStatus::InProgress),
            "Confirmed" => Ok(TransactionStatus::Confirmed),
            "Expired" => Ok(TransactionStatus::Expired),
            "Canceled" => Ok(TransactionStatus::Canceled),
            other => Err(DomainError::unknown("transaction status", other)),
        }
    }
}

/// Progress of turning a finished transaction into task rows.
///
/// ```text
/// Unexported ──► Exporting ──► Exported
///      ▲             │
///      └─────────────┘  (stuck export reset by the re-export sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TasksExportationStatus {
    #[default]
    Unexported,
    Exporting,
    Exported,
}

impl TasksExportationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TasksExportationStatus::Unexported => "Unexported",
            TasksExportationStatus::Exporting => "Exporting",
            TasksExportationStatus::Exported => "Exported",
        }
    }
}

impl std::fmt::Display for TasksExportationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TasksExportationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unexported" => Ok(TasksExportationStatus::Unexported),
            "Exporting" => Ok(TasksExportationStatus::Exporting),
            "Exported" => Ok(TasksExportationStatus::Exported),
            other => Err(DomainError::unknown("tasks exportation status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_in_progress() {
        assert_eq!(TransactionStatus::default(), TransactionStatus::InProgress);
        assert_eq!(
            TasksExportationStatus::default(),
            TasksExportationStatus::Unexported
        );
    }

    #[test]
    fn test_only_in_progress_is_open() {
        assert!(TransactionStatus::InProgress.is_open());
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Expired.is_terminal());
        assert!(TransactionStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_parse_matches_display() {
        for status in [
            TransactionStatus::InProgress,
            TransactionStatus::Confirmed,
            TransactionStatus::Expired,
            TransactionStatus::Canceled,
        ] {
            assert_eq!(status.to_string().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("Done".parse::<TransactionStatus>().is_err());
    }
}

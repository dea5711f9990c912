//! Operator notifications for tasks that ran out of tries.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Result, TaskError};

/// A structured alert for an external reporting channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub details: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Reports alerts through the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        tracing::error!(subject = %alert.subject, details = %alert.details, "operator alert");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    alerts: Vec<Alert>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
///
/// Records every alert it is asked to deliver, including ones it then fails.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every delivery.
    pub async fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().await.fail_on_notify = fail;
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.read().await.alerts.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let mut state = self.state.write().await;
        state.alerts.push(alert.clone());
        if state.fail_on_notify {
            return Err(TaskError::Notification("reporting channel unavailable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert {
            subject: "task aborted".to_string(),
            details: "gateway timeout".to_string(),
        }
    }

    #[tokio::test]
    async fn test_records_alerts() {
        let notifier = InMemoryNotifier::new();
        notifier.notify(&alert()).await.unwrap();
        assert_eq!(notifier.alerts().await, vec![alert()]);
    }

    #[tokio::test]
    async fn test_fail_on_notify_still_records() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_notify(true).await;

        let result = notifier.notify(&alert()).await;
        assert!(matches!(result, Err(TaskError::Notification(_))));
        assert_eq!(notifier.alerts().await.len(), 1);
    }
}

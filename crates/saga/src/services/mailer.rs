//! Mail delivery trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::EmailMessage;

use super::{read, write};
use crate::error::SagaError;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<EmailMessage>,
    fail_on_send: bool,
}

/// In-memory mailer that keeps every sent message.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<RwLock<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the mailer to fail on send calls.
    pub fn set_fail_on_send(&self, fail: bool) {
        write(&self.state).fail_on_send = fail;
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        read(&self.state).sent.clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), SagaError> {
        let mut state = write(&self.state);
        if state.fail_on_send {
            return Err(SagaError::Mailer("SMTP unavailable".to_string()));
        }
        state.sent.push(message.clone());
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::domain::{DomainError, EmailMessage, Mailer, MessageRef};

/// Mailer that records and traces messages instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    sent: Arc<RwLock<Vec<(MessageRef, EmailMessage)>>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, oldest first
    pub async fn sent(&self) -> Vec<(MessageRef, EmailMessage)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<MessageRef, DomainError> {
        if message.to.trim().is_empty() {
            return Err(DomainError::validation("Email recipient cannot be empty"));
        }

        let message_ref = MessageRef(format!("msg-{}", Uuid::new_v4()));

        info!(
            message_id = %message_ref.as_str(),
            to = %message.to,
            subject = %message.subject,
            body_chars = message.body.len(),
            "Email recorded (delivery disabled)"
        );

        self.sent.write().await.push((message_ref.clone(), message));
        Ok(message_ref)
    }
}

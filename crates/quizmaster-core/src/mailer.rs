//! Mail-delivery boundary.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::MailError;

/// An attachment carried by an outbound email.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully-rendered email ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<EmailAttachment>,
}

impl OutboundEmail {
    pub fn new(recipient: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            recipients: vec![recipient.into()],
            subject: subject.into(),
            html_body: html.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: EmailAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Delivery interface consumed by job runners.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError>;
}

/// Recording mailer for tests: keeps every message in memory.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        if email.recipients.is_empty() {
            return Err(MailError::InvalidRecipient("no recipients".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
        Ok(())
    }
}

/// Mailer used when SMTP is disabled: logs and drops every message.
#[derive(Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        tracing::debug!(
            recipients = email.recipients.len(),
            subject = %email.subject,
            "mail delivery disabled, dropping message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_records_messages() {
        let mailer = MemoryMailer::new();
        mailer
            .send(OutboundEmail::new("a@example.com", "hi", "<p>hi</p>"))
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "hi");
    }

    #[tokio::test]
    async fn memory_mailer_rejects_empty_recipients() {
        let mailer = MemoryMailer::new();
        let email = OutboundEmail {
            recipients: vec![],
            subject: "x".into(),
            html_body: String::new(),
            attachment: None,
        };
        assert!(mailer.send(email).await.is_err());
    }
}

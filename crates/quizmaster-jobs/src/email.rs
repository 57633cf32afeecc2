//! SMTP implementation of the mail-delivery boundary.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use quizmaster_core::{MailError, Mailer, OutboundEmail};

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address for every outbound message.
    pub from: String,
}

/// [`Mailer`] backed by an async SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| MailError::InvalidRecipient(format!("invalid from address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::SendFailed(format!("smtp relay setup: {e}")))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        if email.recipients.is_empty() {
            return Err(MailError::InvalidRecipient("no recipients".into()));
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(&email.subject);

        for recipient in &email.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| MailError::InvalidRecipient(format!("{recipient}: {e}")))?;
            builder = builder.to(to);
        }

        let html = SinglePart::html(email.html_body.clone());
        let body = match &email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailError::InvalidMessage(format!("attachment type: {e}")))?;
                MultiPart::mixed().singlepart(html).singlepart(
                    Attachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                )
            }
            None => MultiPart::mixed().singlepart(html),
        };

        let message = builder
            .multipart(body)
            .map_err(|e| MailError::InvalidMessage(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

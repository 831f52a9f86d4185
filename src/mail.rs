//! Outgoing email. Sending is a synchronous part of the request that issues
//! a code: a delivery failure fails the request.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::{EmailBackendKind, EmailSettings};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email (console backend)"
        );
        Ok(())
    }
}

/// Keeps every message in memory so tests can read the codes back.
#[derive(Debug, Default, Clone)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    pub fn last_to(&self, recipient: &str) -> Option<EmailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == recipient)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(message.clone());
        }
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(port);
        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username, password));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(mailbox(&message.from)?)
            .to(mailbox(&message.to)?)
            .subject(message.subject.clone())
            .body(message.body.clone())?;

        self.transport.send(email).await?;
        tracing::info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// Build the mailer selected by configuration.
pub fn from_settings(settings: &EmailSettings) -> Result<Arc<dyn Mailer>, MailError> {
    match (&settings.backend, &settings.smtp) {
        (EmailBackendKind::Smtp, Some(smtp)) => Ok(Arc::new(SmtpMailer::new(
            &smtp.host,
            smtp.port,
            smtp.username.clone(),
            smtp.password.clone(),
        )?)),
        _ => Ok(Arc::new(ConsoleMailer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str, body: &str) -> EmailMessage {
        EmailMessage {
            from: "no-reply@example.com".to_string(),
            to: to.to_string(),
            subject: "Subject".to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_mailer_records_messages() {
        let mailer = MemoryMailer::new();
        mailer.send(&message("a@example.com", "first")).await.unwrap();
        mailer.send(&message("a@example.com", "second")).await.unwrap();
        mailer.send(&message("b@example.com", "third")).await.unwrap();

        assert_eq!(mailer.sent().len(), 3);
        assert_eq!(mailer.last_to("a@example.com").unwrap().body, "second");
        assert!(mailer.last_to("c@example.com").is_none());
    }

    #[tokio::test]
    async fn test_console_mailer_never_fails() {
        assert!(ConsoleMailer.send(&message("a@example.com", "hi")).await.is_ok());
    }

    #[test]
    fn test_invalid_address_rejected() {
        assert!(matches!(mailbox("not an address"), Err(MailError::Address { .. })));
    }
}

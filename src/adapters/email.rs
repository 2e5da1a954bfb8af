//! SMTP email sink built on lettre's async transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SmtpConfig;
use crate::domain::ports::{EmailMessage, EmailSink};

pub struct SmtpEmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpEmailSink {
    /// Build a sink from SMTP configuration. STARTTLS is attempted and
    /// falls back to plaintext for local relays.
    pub fn new(config: &SmtpConfig) -> DomainResult<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DomainError::AlertDispatch {
                    channel: "email".into(),
                    reason: format!("smtp transport: {e}"),
                })?
                .port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from_email.clone(),
        })
    }
}

#[async_trait]
impl EmailSink for SmtpEmailSink {
    async fn send(&self, message: &EmailMessage) -> DomainResult<()> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e| DomainError::AlertDispatch {
                channel: "email".into(),
                reason: format!("invalid from address {}: {e}", self.from),
            })?)
            .to(message.to.parse().map_err(|e| DomainError::AlertDispatch {
                channel: "email".into(),
                reason: format!("invalid recipient {}: {e}", message.to),
            })?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| DomainError::AlertDispatch {
                channel: "email".into(),
                reason: format!("build message: {e}"),
            })?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DomainError::AlertDispatch {
                channel: "email".into(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

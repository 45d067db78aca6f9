//! Outbound mail.
//!
//! [`SmtpMailer`] relays through the configured SMTP host over implicit TLS.
//! Without mail settings the service runs with [`LogMailer`], which only logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl Mail {
    pub fn to(recipient: &str, subject: &str, html: String) -> Self {
        Self { to: vec![recipient.to_string()], bcc: Vec::new(), subject: subject.to_string(), html }
    }

    /// Bulk mail with every recipient hidden from the others.
    pub fn blind(recipients: Vec<String>, subject: &str, html: String) -> Self {
        Self { to: Vec::new(), bcc: recipients, subject: subject.to_string(), html }
    }

    pub fn recipient_count(&self) -> usize { self.to.len() + self.bcc.len() }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = mailbox(&config.from)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
            .build();
        Ok(Self { transport, from })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|_| MailError::InvalidAddress(address.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(mail.subject.as_str());
        for to in &mail.to {
            builder = builder.to(mailbox(to)?);
        }
        for bcc in &mail.bcc {
            builder = builder.bcc(mailbox(bcc)?);
        }
        let message = builder.header(ContentType::TEXT_HTML).body(mail.html)?;
        self.transport.send(message).await?;
        tracing::info!(recipients = mail.to.len() + mail.bcc.len(), subject = %mail.subject, "Email sent");
        Ok(())
    }
}

/// Drops every message after logging it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        tracing::info!(to = ?mail.to, bcc = mail.bcc.len(), subject = %mail.subject, "Mail relay not configured, message dropped");
        Ok(())
    }
}

pub fn otp_mail(to: &str, otp: &str, admin: bool) -> Mail {
    let (subject, greeting) = if admin {
        ("Your BZ Cart Admin Verification Code", "Hello Admin! Welcome to the BZ Cart management system.")
    } else {
        ("Your BZ Cart Verification Code", "Welcome to BZ Cart!")
    };
    let html = format!(
        "<div style=\"font-family:Helvetica,Arial,sans-serif;text-align:center\">\
         <h2>bzcart.store</h2><p>{greeting}</p>\
         <p>Use the following OTP to complete your verification:</p>\
         <p style=\"font-size:40px;letter-spacing:8px;color:#ffa500\"><b>{otp}</b></p>\
         <p>This OTP is valid for 10 minutes. Do not share it with anyone.</p></div>"
    );
    Mail::to(to, subject, html)
}

pub fn discount_mail(to: &str, code: &str, percent: u32, expires_at: DateTime<Utc>) -> Mail {
    let html = format!(
        "<div style=\"font-family:Helvetica,Arial,sans-serif;text-align:center\">\
         <h2>Thanks for subscribing to BZ Cart!</h2>\
         <p>Here is your {percent}% discount code:</p>\
         <p style=\"font-size:32px;letter-spacing:4px;color:#ffa500\"><b>{code}</b></p>\
         <p>Use it at checkout before {}.</p></div>",
        expires_at.format("%B %e, %Y")
    );
    Mail::to(to, "Your BZ Cart Discount Code", html)
}

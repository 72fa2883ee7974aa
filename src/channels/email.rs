//! Outbound email: the `Mailer` seam and its SMTP implementation via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::SmtpConfig;
use crate::error::DeliveryError;

/// A plain-text email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Acknowledgement from the delivery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub status_code: u16,
}

impl SendReceipt {
    /// 2xx, accepted for delivery.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Transactional email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError>;
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Sends through an authenticated SMTP relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError> {
        let message = build_message(email)?;
        let config = self.config.clone();

        // lettre's SmtpTransport is blocking.
        let receipt = tokio::task::spawn_blocking(move || send_blocking(&config, &message))
            .await
            .map_err(|e| DeliveryError::Transport(format!("SMTP task panicked: {e}")))??;

        tracing::info!(
            to = %email.to,
            status_code = receipt.status_code,
            "Email sent"
        );
        Ok(receipt)
    }
}

fn send_blocking(config: &SmtpConfig, message: &Message) -> Result<SendReceipt, DeliveryError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.host)
        .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?
        .port(config.port)
        .credentials(creds)
        .build();

    let response = transport
        .send(message)
        .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {e}")))?;

    let status_code = response.code().to_string().parse().unwrap_or(0);
    if !response.is_positive() {
        return Err(DeliveryError::Rejected { status_code });
    }
    Ok(SendReceipt { status_code })
}

/// Build the lettre message for a plain-text email.
pub fn build_message(email: &OutboundEmail) -> Result<Message, DeliveryError> {
    Message::builder()
        .from(email.from.parse().map_err(|e| DeliveryError::InvalidAddress {
            field: "from".into(),
            reason: format!("{e}"),
        })?)
        .to(email.to.parse().map_err(|e| DeliveryError::InvalidAddress {
            field: "to".into(),
            reason: format!("{e}"),
        })?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

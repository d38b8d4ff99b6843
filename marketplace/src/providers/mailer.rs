//! Transactional email.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Mail delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// The email API could not be reached.
    #[error("Email API unreachable: {0}")]
    Network(String),

    /// The email API rejected the message.
    #[error("Email API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// API message.
        message: String,
    },
}

/// An outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Plain-text body.
    pub text: String,
    /// Reply-To header.
    pub reply_to: Option<String>,
}

/// Sends email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Send each message, logging failures.
///
/// Notification emails never fail the request that triggered them.
pub async fn deliver_all(mailer: &dyn Mailer, emails: Vec<Email>) {
    for email in emails {
        match mailer.send(&email).await {
            Ok(()) => {
                metrics::counter!("email.sent").increment(1);
            },
            Err(error) => {
                metrics::counter!("email.failed").increment(1);
                tracing::warn!(%error, subject = %email.subject, "Failed to send email");
            },
        }
    }
}

// ============================================================================
// Resend
// ============================================================================

/// Resend settings.
#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// API base, `https://api.resend.com`.
    pub api_base: String,
    /// API key.
    pub api_key: String,
    /// Sender, e.g. `Gigbook <bookings@gigbook.app>`.
    pub from: String,
    /// HTTP timeout.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Email over the Resend JSON API.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    config: ResendConfig,
}

impl ResendMailer {
    /// Create a mailer.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Network`] if the HTTP client cannot be built.
    pub fn new(config: ResendConfig) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[tracing::instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let payload = ResendPayload {
            from: &self.config.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
            reply_to: email.reply_to.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_base.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Email accepted");
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(MailError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

// ============================================================================
// Console
// ============================================================================

/// Logs messages instead of sending them. Used when no API key is set.
#[derive(Debug, Clone, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            reply_to = ?email.reply_to,
            "Email (console)\n{}",
            email.text
        );
        Ok(())
    }
}

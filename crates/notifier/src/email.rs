//! Email delivery.
//!
//! `EmailSender` is the seam between the dispatcher and the transactional
//! email provider. Production uses `SendGridSender`; tests use the recording
//! sender in `mock`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One outgoing plain-text email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub status_code: u16,
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("send failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a single message.
    async fn send(&self, email: &EmailMessage) -> Result<SendReceipt, EmailError>;
}

/// SendGrid v3 `mail/send` client.
pub struct SendGridSender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl SendGridSender {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Request body for a single-recipient, plain-text message.
    fn request_body(email: &EmailMessage) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": email.from },
            "subject": email.subject,
            "content": [{ "type": "text/plain", "value": email.text_body }],
        })
    }
}

#[async_trait]
impl EmailSender for SendGridSender {
    async fn send(&self, email: &EmailMessage) -> Result<SendReceipt, EmailError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(SendReceipt {
            status_code: status.as_u16(),
            message_id,
        })
    }
}

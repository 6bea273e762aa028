// --- File: crates/bookify_mailer/src/service.rs ---
//! Mailer implementation over an HTTP mail API.
//!
//! Post-commit mail is best-effort: callers log failures and never let them
//! change a booking's fate.

use base64::{engine::general_purpose, Engine as _};
use bookify_common::services::{BoxFuture, BoxedError, MailMessage, Mailer};
use bookify_config::MailerConfig;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

/// Mailer-specific error types.
#[derive(Error, Debug)]
pub enum MailerError {
    /// Error occurred during the mail API request
    #[error("Mail API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Error returned by the mail API
    #[error("Mail API returned an error: {message} (Status: {status_code})")]
    ApiError { status_code: u16, message: String },
}

/// Sends through a JSON mail API with bearer authentication.
pub struct HttpMailer {
    config: MailerConfig,
    http: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: MailerConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    async fn send_inner(&self, message: MailMessage) -> Result<(), MailerError> {
        let mut body = json!({
            "from": {
                "address": self.config.from_address,
                "name": self.config.from_name,
            },
            "to": [{ "address": message.to }],
            "subject": message.subject,
            "text": message.body,
        });

        if let Some(ics) = &message.ics {
            body["attachments"] = json!([{
                "filename": "invite.ics",
                "content_type": "text/calendar; method=REQUEST",
                "content": general_purpose::STANDARD.encode(ics.as_bytes()),
            }]);
        }

        debug!("Sending mail '{}' to {}", message.subject, message.to);

        let response = self
            .http
            .post(format!("{}/messages", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let api_message = response.text().await.unwrap_or_default();
            return Err(MailerError::ApiError {
                status_code,
                message: api_message,
            });
        }

        info!("Mail '{}' accepted for {}", message.subject, message.to);
        Ok(())
    }
}

impl Mailer for HttpMailer {
    fn send(&self, message: MailMessage) -> BoxFuture<'_, (), BoxedError> {
        Box::pin(async move { self.send_inner(message).await.map_err(BoxedError::new) })
    }
}

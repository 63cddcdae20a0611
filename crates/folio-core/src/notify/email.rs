//! Email channel through an HTTP mail API (Resend-compatible).
//!
//! The API key is read from the environment variable named in
//! `[notify.email] api_key_env` and held in a [`Zeroizing`] buffer so it is
//! wiped from memory when the sink is dropped.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use zeroize::Zeroizing;

use folio_config::EmailConfig;

use super::{Notification, NotificationSink, NotifyError};
use crate::BoxFuture;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends each submission as a plain-text email.
pub struct EmailSink {
    client: Client,
    api_url: String,
    api_key: Zeroizing<String>,
    from: String,
    to: String,
}

impl EmailSink {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_key: Zeroizing::new(api_key.into()),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Build from config, reading the API key from the environment.
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .map(Zeroizing::new)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NotifyError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            from: config.from.clone(),
            to: config.to.clone(),
        })
    }
}

impl fmt::Debug for EmailSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSink")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: String,
    reply_to: &'a str,
}

impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let body = MailRequest {
                from: &self.from,
                to: [&self.to],
                subject: format!("New portfolio contact from {}", notification.submission.name),
                text: notification.summary(),
                reply_to: &notification.submission.email,
            };

            let resp = self
                .client
                .post(&self.api_url)
                .bearer_auth(self.api_key.as_str())
                .timeout(DELIVERY_TIMEOUT)
                .json(&body)
                .send()
                .await
                .map_err(|e| NotifyError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            if !resp.status().is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(NotifyError::Rejected {
                    channel: "email",
                    status,
                    message,
                });
            }

            debug!(status, to = %self.to, "Mail API accepted notification");
            Ok(())
        })
    }
}

//! Chat webhook channel (Discord/Slack-style incoming webhooks).

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{Notification, NotificationSink, NotifyError};
use crate::BoxFuture;
use crate::validate::SanitizedSubmission;

/// Upper bound for one webhook round trip.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat services cap message text; longer summaries are cut.
const CONTENT_LIMIT: usize = 2000;

/// Posts a JSON summary of each submission to a webhook URL.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: String,
    submission: &'a SanitizedSubmission,
    client_id: &'a str,
    user_agent: Option<&'a str>,
    received_at: String,
}

impl<'a> From<&'a Notification> for WebhookPayload<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            content: n.summary().chars().take(CONTENT_LIMIT).collect(),
            submission: &n.submission,
            client_id: &n.client_id,
            user_agent: n.user_agent.as_deref(),
            received_at: n.received_at.to_rfc3339(),
        }
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.url)
                .timeout(DELIVERY_TIMEOUT)
                .json(&WebhookPayload::from(notification))
                .send()
                .await
                .map_err(|e| NotifyError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            if !resp.status().is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(NotifyError::Rejected {
                    channel: "webhook",
                    status,
                    message,
                });
            }

            debug!(status, "Webhook accepted notification");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::receiver;
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;

    fn notification(message: &str) -> Notification {
        Notification::new(
            SanitizedSubmission {
                name: "Ana".to_string(),
                email: "ana@x.com".to_string(),
                message: message.to_string(),
            },
            "203.0.113.7",
            None,
        )
    }

    #[tokio::test]
    async fn test_posts_summary_and_fields() {
        let (url, captured) = receiver::spawn(StatusCode::NO_CONTENT).await;
        let sink = WebhookSink::new(url);

        sink.deliver(&notification("hi there")).await.unwrap();

        let posts = captured.lock().unwrap();
        assert_eq!(posts.len(), 1);
        let body = &posts[0].1;
        assert_eq!(body["submission"]["name"], "Ana");
        assert_eq!(body["submission"]["message"], "hi there");
        assert_eq!(body["client_id"], "203.0.113.7");
        assert!(body["content"].as_str().unwrap().contains("hi there"));
    }

    #[tokio::test]
    async fn test_long_content_is_cut() {
        let (url, captured) = receiver::spawn(StatusCode::OK).await;
        let sink = WebhookSink::new(url);

        sink.deliver(&notification(&"x".repeat(5000))).await.unwrap();

        let posts = captured.lock().unwrap();
        let content = posts[0].1["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), CONTENT_LIMIT);
        assert_eq!(
            posts[0].1["submission"]["message"].as_str().unwrap().len(),
            5000
        );
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let (url, _captured) = receiver::spawn(StatusCode::INTERNAL_SERVER_ERROR).await;
        let sink = WebhookSink::new(url);

        let err = sink.deliver(&notification("hi")).await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Rejected {
                channel: "webhook",
                status: 500,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = WebhookSink::new(format!("http://{addr}/hook"));
        let err = sink.deliver(&notification("hi")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Network(_)));
    }
}

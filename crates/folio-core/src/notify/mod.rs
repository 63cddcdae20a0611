//! Delivery of accepted submissions to outward channels.
//!
//! Every channel implements [`NotificationSink`]. The [`Dispatcher`] fans a
//! [`Notification`] out to all configured sinks; a failing sink is logged
//! and never fails the contact request.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!                ┌──▶│ WebhookSink  │──▶ chat webhook
//! ┌────────────┐ │   └──────────────┘
//! │ Dispatcher │─┼──▶┌──────────────┐
//! └────────────┘ │   │  EmailSink   │──▶ HTTP mail API
//!                │   └──────────────┘
//!                └──▶┌──────────────┐
//!                    │  FileStore   │──▶ submissions.json
//!                    └──────────────┘
//! ```

pub mod dispatch;
pub mod email;
pub mod store;
pub mod webhook;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::validate::SanitizedSubmission;

pub use dispatch::{DeliveryReport, Dispatcher};
pub use email::EmailSink;
pub use store::{FileStore, StoredSubmission};
pub use webhook::WebhookSink;

/// An accepted submission plus request metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub submission: SanitizedSubmission,
    pub client_id: String,
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    /// Wrap a submission received now.
    pub fn new(
        submission: SanitizedSubmission,
        client_id: impl Into<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            submission,
            client_id: client_id.into(),
            user_agent,
            received_at: Utc::now(),
        }
    }

    /// Human-readable text used by chat and mail channels.
    pub fn summary(&self) -> String {
        let s = &self.submission;
        format!(
            "New contact form submission from {} <{}>\n\n{}\n\nsent by {} via {} at {}",
            s.name,
            s.email,
            s.message,
            self.client_id,
            self.user_agent.as_deref().unwrap_or("unknown agent"),
            self.received_at.to_rfc3339(),
        )
    }
}

/// Errors from notification channels.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{channel} rejected the notification: {status}: {message}")]
    Rejected {
        channel: &'static str,
        status: u16,
        message: String,
    },

    #[error("mail API key missing: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored submissions are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// An outward channel for accepted submissions.
///
/// Implementations must be `Send + Sync` for use from request handlers.
/// Uses `BoxFuture` for object safety (allows `Arc<dyn NotificationSink>`).
pub trait NotificationSink: Send + Sync {
    /// Channel name used in logs (e.g. "webhook", "email").
    fn name(&self) -> &str;

    /// Deliver one notification.
    fn deliver<'a>(&'a self, notification: &'a Notification)
    -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Local HTTP endpoint for exercising outbound channels in tests.
#[cfg(test)]
pub(crate) mod receiver {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    pub(crate) type Captured = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    /// Record every JSON post and answer each with `status`.
    pub(crate) async fn spawn(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route("/hook", post(record))
            .with_state((captured.clone(), status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), captured)
    }

    async fn record(
        State((captured, status)): State<(Captured, StatusCode)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        captured.lock().unwrap().push((headers, body));
        status
    }
}

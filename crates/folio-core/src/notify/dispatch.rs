//! Fan-out of notifications to every configured channel.

use std::sync::Arc;

use tracing::{debug, info, warn};

use folio_config::NotifyConfig;

use super::{EmailSink, FileStore, Notification, NotificationSink, WebhookSink};

/// Which channels took a notification and which failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delivers each notification to every sink in registration order.
#[derive(Clone, Default)]
pub struct Dispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the channels named in `[notify]`.
    ///
    /// An email channel whose API key is missing is skipped with a warning
    /// so the rest of the service still starts.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut dispatcher = Self::new();

        if let Some(url) = &config.webhook_url {
            dispatcher.add_sink(Arc::new(WebhookSink::new(url.clone())));
        }

        if let Some(email) = &config.email {
            match EmailSink::from_config(email) {
                Ok(sink) => dispatcher.add_sink(Arc::new(sink)),
                Err(e) => warn!(error = %e, "Email notifications disabled"),
            }
        }

        if let Some(path) = &config.store_path {
            dispatcher.add_sink(Arc::new(FileStore::new(path)));
        }

        if dispatcher.is_empty() {
            info!("No notification channels configured; submissions are only logged");
        } else {
            info!(channels = ?dispatcher.sink_names(), "Notification channels ready");
        }
        dispatcher
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Deliver to every sink. Failures are logged and reported, never raised.
    pub async fn dispatch(&self, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for sink in &self.sinks {
            let name = sink.name().to_string();
            match sink.deliver(notification).await {
                Ok(()) => {
                    debug!(sink = %name, "Notification delivered");
                    report.delivered.push(name);
                }
                Err(e) => {
                    warn!(sink = %name, error = %e, "Notification delivery failed");
                    report.failed.push(name);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::notify::NotifyError;
    use crate::validate::SanitizedSubmission;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl CountingSink {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl NotificationSink for CountingSink {
        fn name(&self) -> &str {
            self.name
        }

        fn deliver<'a>(&'a self, _n: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    Err(NotifyError::Network("connection refused".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn notification() -> Notification {
        Notification::new(
            SanitizedSubmission {
                name: "Ana".to_string(),
                email: "ana@x.com".to_string(),
                message: "hi".to_string(),
            },
            "unknown",
            None,
        )
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_sinks() {
        let first = CountingSink::new("first", true);
        let second = CountingSink::new("second", false);
        let dispatcher = Dispatcher::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        let report = dispatcher.dispatch(&notification()).await;

        assert_eq!(report.failed, vec!["first".to_string()]);
        assert_eq!(report.delivered, vec!["second".to_string()]);
        assert!(!report.all_delivered());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_dispatcher_reports_nothing() {
        let report = Dispatcher::new().dispatch(&notification()).await;
        assert_eq!(report, DeliveryReport::default());
        assert!(report.all_delivered());
    }

    #[test]
    fn test_from_config_builds_channels_in_order() {
        let config = NotifyConfig {
            webhook_url: Some("https://hooks.example.com/abc".to_string()),
            email: None,
            store_path: Some("data/submissions.json".to_string()),
        };
        let dispatcher = Dispatcher::from_config(&config);
        assert_eq!(dispatcher.sink_names(), vec!["webhook", "store"]);
    }

    #[test]
    fn test_from_config_skips_email_without_key() {
        let config = NotifyConfig {
            webhook_url: None,
            email: Some(folio_config::EmailConfig {
                api_url: "https://mail.example.com/send".to_string(),
                api_key_env: "FOLIO_TEST_DISPATCH_KEY_NEVER_SET".to_string(),
                from: "site@folio.dev".to_string(),
                to: "me@folio.dev".to_string(),
            }),
            store_path: None,
        };
        assert!(Dispatcher::from_config(&config).is_empty());
    }
}

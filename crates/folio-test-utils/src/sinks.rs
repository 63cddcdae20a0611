//! Notification sinks for asserting on deliveries.

use std::sync::{Arc, Mutex};

use folio_core::{BoxFuture, Notification, NotificationSink, NotifyError};

/// Keeps every notification it receives.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.received.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.lock().push(notification.clone());
            Ok(())
        })
    }
}

/// Fails every delivery with a network error.
pub struct FailingSink;

impl NotificationSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn deliver<'a>(&'a self, _: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async { Err(NotifyError::Network("connection refused".to_string())) })
    }
}

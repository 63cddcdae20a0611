#![deny(unsafe_code)]

//! folio contact service runtime.
//!
//! Wires the [`AbuseGuard`](folio_guard::AbuseGuard) into an axum HTTP edge,
//! validates and sanitizes submissions, and fans accepted ones out to the
//! configured notification channels.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future for async trait methods that
/// need dynamic dispatch (`dyn NotificationSink`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Daemon lifecycle and periodic guard maintenance.
pub mod daemon;
/// HTTP routes, headers, and error responses.
pub mod http;
/// Notification channels and fan-out.
pub mod notify;
/// Field validation and sanitization.
pub mod validate;

pub use daemon::{Daemon, DaemonError, ShutdownSignal};
pub use http::{AppState, router};
pub use notify::{
    DeliveryReport, Dispatcher, EmailSink, FileStore, Notification, NotificationSink,
    NotifyError, StoredSubmission, WebhookSink,
};
pub use validate::{ContactRequest, ContentValidator, SanitizedSubmission, ValidationError};

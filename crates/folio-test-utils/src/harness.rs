//! In-process contact API driven by a manual clock.
//!
//! [`TestApp`] builds the real router around an [`AbuseGuard`] whose clock
//! only moves when the test advances it, so window and block expiry can be
//! exercised without sleeping.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use folio_config::AppConfig;
use folio_core::{AppState, Dispatcher, NotificationSink, router};
use folio_guard::{AbuseGuard, ManualClock};

use crate::sinks::RecordingSink;

/// A response with its body decoded as JSON (`Null` when empty).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `error` field of an error body.
    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

/// The contact router plus handles on its clock, guard, and deliveries.
pub struct TestApp {
    pub config: AppConfig,
    pub clock: ManualClock,
    pub guard: Arc<AbuseGuard>,
    pub sink: Arc<RecordingSink>,
    router: Router,
}

impl TestApp {
    /// Build with a recording sink as the only channel.
    pub fn new(config: AppConfig) -> Self {
        Self::with_extra_sinks(config, Vec::new())
    }

    /// Build with a recording sink first, then `extra` in order.
    pub fn with_extra_sinks(config: AppConfig, extra: Vec<Arc<dyn NotificationSink>>) -> Self {
        let clock = ManualClock::new();
        let guard = Arc::new(AbuseGuard::new(
            config.guard_config(),
            Arc::new(clock.clone()),
        ));
        let sink = RecordingSink::new();

        let mut dispatcher = Dispatcher::new().with_sink(sink.clone());
        for s in extra {
            dispatcher.add_sink(s);
        }

        let state = AppState::new(&config, guard.clone(), dispatcher)
            .expect("validator patterns compile");
        Self {
            router: router(Arc::new(state)),
            config,
            clock,
            guard,
            sink,
        }
    }

    /// Send any request through the router.
    pub async fn request(&self, req: Request<Body>) -> TestResponse {
        let resp = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("router is infallible");
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("JSON response body")
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// POST a JSON submission as `client` (sent in `x-forwarded-for`).
    pub async fn submit(&self, client: &str, body: &Value) -> TestResponse {
        self.post_raw(client, "application/json", body.to_string())
            .await
    }

    /// POST an arbitrary body with the given content type.
    pub async fn post_raw(
        &self,
        client: &str,
        content_type: &str,
        body: impl Into<Body>,
    ) -> TestResponse {
        let req = Request::post("/api/contact")
            .header("content-type", content_type)
            .header("x-forwarded-for", client)
            .body(body.into())
            .expect("valid request");
        self.request(req).await
    }
}

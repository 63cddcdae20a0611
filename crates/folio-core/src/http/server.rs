//! Contact API server: axum router, route handlers, and TCP serving.

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::SecondsFormat;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use folio_config::{AppConfig, ServerConfig};
use folio_guard::{AbuseGuard, Verdict};

use super::client_id::client_id;
use super::error::ApiError;
use super::headers::{EdgeHeaders, edge_headers};
use super::types::*;
use crate::daemon::ShutdownSignal;
use crate::notify::{Dispatcher, Notification};
use crate::validate::{ContactRequest, ContentValidator};

const SUCCESS_MESSAGE: &str = "Thank you for your message! I'll get back to you soon.";

/// Shared state accessible to all route handlers.
pub struct AppState {
    pub guard: Arc<AbuseGuard>,
    pub validator: ContentValidator,
    pub dispatcher: Dispatcher,
    pub server: ServerConfig,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        guard: Arc<AbuseGuard>,
        dispatcher: Dispatcher,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            guard,
            validator: ContentValidator::new(config.validation.clone())?,
            dispatcher,
            server: config.server.clone(),
        })
    }
}

/// Build the axum router with all routes and edge layers.
pub fn router(state: Arc<AppState>) -> Router {
    let edge = Arc::new(EdgeHeaders::new(&state.server.allowed_origins));
    let expose_detail = state.server.is_development();

    let routes = Router::new()
        .route(
            "/api/contact",
            post(handle_contact)
                .get(handle_info)
                .options(handle_preflight),
        )
        .route("/healthz", get(handle_health))
        .fallback(handle_not_found)
        .with_state(state);

    with_edge_layers(routes, edge, expose_detail)
}

/// Panic recovery, response headers, and request tracing, innermost first.
pub(crate) fn with_edge_layers(
    routes: Router,
    edge: Arc<EdgeHeaders>,
    expose_detail: bool,
) -> Router {
    routes
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| panic_response(panic, expose_detail),
        ))
        .layer(middleware::from_fn_with_state(edge, edge_headers))
        .layer(TraceLayer::new_for_http())
}

/// Serve the contact API on `listener` until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    info!(addr = %listener.local_addr()?, "Contact API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Contact API shutting down");
        })
        .await
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_contact(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ContactResponse>, ApiError> {
    let client = client_id(&headers);

    // Held until the response is produced; dropping it frees the slot.
    let _admission = match state.guard.admit(&client) {
        Verdict::Admit(admission) => admission,
        Verdict::Reject(reason) => return Err(ApiError::Rejected(reason)),
    };

    if !is_json(&headers) {
        return Err(ApiError::UnsupportedMediaType);
    }

    let limit = state.server.max_body_bytes;
    if declared_length(&headers).is_some_and(|len| len > limit as u64) {
        return Err(ApiError::PayloadTooLarge);
    }
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        debug!(client = %client, error = %e, "Request body rejected");
        ApiError::PayloadTooLarge
    })?;

    let request: ContactRequest = serde_json::from_slice(&bytes).map_err(|e| {
        debug!(client = %client, error = %e, "Malformed contact payload");
        ApiError::MalformedJson
    })?;

    let submission = state.validator.validate(&request).map_err(|e| {
        if e.is_suspicious() {
            state.guard.record_suspicious(&client);
            warn!(client = %client, "Suspicious submission rejected");
        }
        ApiError::from(e)
    })?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let notification = Notification::new(submission, client.clone(), user_agent);
    let report = state.dispatcher.dispatch(&notification).await;
    info!(
        client = %client,
        delivered = ?report.delivered,
        failed = ?report.failed,
        "Contact submission accepted"
    );

    Ok(Json(ContactResponse {
        success: true,
        message: SUCCESS_MESSAGE.to_string(),
        timestamp: notification
            .received_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn handle_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let guard = state.guard.config();
    let limits = state.validator.limits();
    Json(InfoResponse {
        endpoint: "/api/contact".to_string(),
        methods: vec!["POST".to_string(), "GET".to_string(), "OPTIONS".to_string()],
        rate_limit: RateLimitInfo {
            window_secs: guard.window.as_secs(),
            max_requests_per_window: guard.max_requests_per_window,
            block_secs: guard.block_penalty.as_secs(),
            max_concurrent_requests: guard.max_concurrent_requests,
        },
        field_limits: FieldLimits {
            name: limits.max_name_len,
            email: limits.max_email_len,
            message: limits.max_message_len,
        },
    })
}

async fn handle_preflight() -> StatusCode {
    StatusCode::OK
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
    })
}

async fn handle_not_found() -> ApiError {
    ApiError::NotFound
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_detail: bool) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal {
        detail,
        expose: expose_detail,
    }
    .into_response()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

//! Error responses of the contact API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use folio_guard::RejectReason;

use super::types::ErrorResponse;
use crate::validate::ValidationError;

/// Everything the contact endpoint can answer with besides success.
///
/// Messages are generic: they never reveal counters, thresholds, or which
/// dangerous pattern matched.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("admission rejected: {0}")]
    Rejected(RejectReason),

    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,

    #[error("request body is too large")]
    PayloadTooLarge,

    #[error("request body is not valid JSON")]
    MalformedJson,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("not found")]
    NotFound,

    #[error("internal error: {detail}")]
    Internal { detail: String, expose: bool },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected(RejectReason::ServiceOverloaded) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rejected(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedJson | Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        let (error, code, detail) = match self {
            Self::Rejected(reason) => {
                let message = if reason.is_client_budget() {
                    "Too many requests. Please try again later."
                } else {
                    "Service temporarily unavailable. Please try again later."
                };
                (message.to_string(), Some(reason.code().to_string()), None)
            }
            Self::Internal { detail, expose } => (
                "Internal server error".to_string(),
                None,
                expose.then(|| detail.clone()),
            ),
            other => (other.to_string(), None, None),
        };
        ErrorResponse {
            success: false,
            error,
            code,
            detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { detail, .. } = &self {
            error!(detail = %detail, "Unhandled error in contact endpoint");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

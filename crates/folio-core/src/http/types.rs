//! Request and response bodies for the contact API.

use serde::{Deserialize, Serialize};

/// Body of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
    /// RFC 3339 UTC timestamp of receipt.
    pub timestamp: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// Machine-readable reason for admission rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Internal error detail, only in development.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Body of `GET /api/contact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub endpoint: String,
    pub methods: Vec<String>,
    pub rate_limit: RateLimitInfo,
    pub field_limits: FieldLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub window_secs: u64,
    pub max_requests_per_window: u32,
    pub block_secs: u64,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLimits {
    pub name: usize,
    pub email: usize,
    pub message: usize,
}

/// Body of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
}

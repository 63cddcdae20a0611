#![deny(unsafe_code)]

//! Configuration loading and validation for the folio contact service.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure; every field has a default so an empty
//! file (or no file at all) yields a working local setup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Abuse guard limits.
    #[serde(default)]
    pub guard: GuardSettings,

    /// Contact form field limits.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Where accepted submissions are delivered.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the HTTP listener and response policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the server binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// "production" or "development". Development exposes internal error
    /// detail in 500 responses.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Origins allowed by CORS. The first entry is the fallback origin sent
    /// to callers whose origin is not listed.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            environment: default_environment(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    /// Whether internal error detail may be shown to callers.
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Abuse guard limits as expressed in TOML (durations in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Per-client window length.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests a client may make per window.
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,

    /// Block penalty length.
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,

    /// Requests a client may have in flight at once.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// How long an admitted request may hold a concurrency slot.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Suspicious submissions tolerated before a block.
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: u32,

    /// Process-wide window length.
    #[serde(default = "default_global_window_secs")]
    pub global_window_secs: u64,

    /// Requests admitted across all clients per global window.
    #[serde(default = "default_global_max_requests")]
    pub global_max_requests: u64,

    /// Interval between sweeps of expired clients (0 = never sweep).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound on tracked clients (0 = unbounded).
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests_per_window: default_max_requests_per_window(),
            block_secs: default_block_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout_secs(),
            suspicious_threshold: default_suspicious_threshold(),
            global_window_secs: default_global_window_secs(),
            global_max_requests: default_global_max_requests(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_tracked_clients: default_max_tracked_clients(),
        }
    }
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_max_requests_per_window() -> u32 {
    5
}

fn default_block_secs() -> u64 {
    60 * 60
}

fn default_max_concurrent_requests() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_suspicious_threshold() -> u32 {
    3
}

fn default_global_window_secs() -> u64 {
    60
}

fn default_global_max_requests() -> u64 {
    100
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_max_tracked_clients() -> usize {
    10_000
}

/// Maximum lengths (in characters) for contact form fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    #[serde(default = "default_max_email_len")]
    pub max_email_len: usize,

    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_name_len: default_max_name_len(),
            max_email_len: default_max_email_len(),
            max_message_len: default_max_message_len(),
        }
    }
}

fn default_max_name_len() -> usize {
    100
}

fn default_max_email_len() -> usize {
    254
}

fn default_max_message_len() -> usize {
    5000
}

/// Notification channels for accepted submissions.
///
/// Every channel is optional; with none configured, submissions are
/// accepted and only logged.
///
/// ## TOML Example
///
/// ```toml
/// [notify]
/// webhook_url = "https://discord.com/api/webhooks/..."
/// store_path = "data/submissions.json"
///
/// [notify.email]
/// api_url = "https://api.resend.com/emails"
/// api_key_env = "FOLIO_MAIL_API_KEY"
/// from = "Portfolio <contact@example.dev>"
/// to = "me@example.dev"
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook that receives a JSON summary of each submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// HTTP mail API used to email each submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailConfig>,

    /// JSON file that accumulates every submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
}

/// HTTP mail API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Endpoint that accepts `{from, to, subject, text}` JSON.
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_mail_api_key_env")]
    pub api_key_env: String,

    /// Sender address.
    pub from: String,

    /// Recipient address.
    pub to: String,
}

fn default_mail_api_url() -> String {
    "https://api.resend.com/emails".to_string()
}

fn default_mail_api_key_env() -> String {
    "FOLIO_MAIL_API_KEY".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }
        let valid_environments = ["production", "development"];
        if !valid_environments.contains(&server.environment.as_str()) {
            return Err(ConfigError::Validation(format!(
                "server.environment must be one of {:?}, got {:?}",
                valid_environments, server.environment
            )));
        }
        if server.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_body_bytes must be non-zero".to_string(),
            ));
        }
        if server.allowed_origins.is_empty() {
            return Err(ConfigError::Validation(
                "server.allowed_origins must list at least one origin".to_string(),
            ));
        }
        for (i, origin) in server.allowed_origins.iter().enumerate() {
            if !is_http_url(origin) {
                return Err(ConfigError::Validation(format!(
                    "server.allowed_origins[{i}] must be an http(s) origin, got {origin:?}"
                )));
            }
        }

        // Validate guard limits
        let guard = &self.guard;
        let non_zero = [
            ("guard.window_secs", guard.window_secs),
            (
                "guard.max_requests_per_window",
                u64::from(guard.max_requests_per_window),
            ),
            ("guard.block_secs", guard.block_secs),
            (
                "guard.max_concurrent_requests",
                guard.max_concurrent_requests as u64,
            ),
            ("guard.request_timeout_secs", guard.request_timeout_secs),
            (
                "guard.suspicious_threshold",
                u64::from(guard.suspicious_threshold),
            ),
            ("guard.global_window_secs", guard.global_window_secs),
            ("guard.global_max_requests", guard.global_max_requests),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }

        // Validate field limits
        let limits = [
            ("validation.max_name_len", self.validation.max_name_len),
            ("validation.max_email_len", self.validation.max_email_len),
            ("validation.max_message_len", self.validation.max_message_len),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }

        // Validate notification channels
        if let Some(url) = &self.notify.webhook_url
            && !is_http_url(url)
        {
            return Err(ConfigError::Validation(format!(
                "notify.webhook_url must be an http(s) URL, got {url:?}"
            )));
        }
        if let Some(email) = &self.notify.email {
            if !is_http_url(&email.api_url) {
                return Err(ConfigError::Validation(format!(
                    "notify.email.api_url must be an http(s) URL, got {:?}",
                    email.api_url
                )));
            }
            if email.api_key_env.is_empty() {
                return Err(ConfigError::Validation(
                    "notify.email.api_key_env must not be empty".to_string(),
                ));
            }
            if email.from.is_empty() || email.to.is_empty() {
                return Err(ConfigError::Validation(
                    "notify.email.from and notify.email.to must not be empty".to_string(),
                ));
            }
        }
        if self.notify.store_path.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "notify.store_path must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the guard limits from the `[guard]` section.
    pub fn guard_config(&self) -> folio_guard::GuardConfig {
        let g = &self.guard;
        folio_guard::GuardConfig {
            window: Duration::from_secs(g.window_secs),
            max_requests_per_window: g.max_requests_per_window,
            block_penalty: Duration::from_secs(g.block_secs),
            max_concurrent_requests: g.max_concurrent_requests,
            request_timeout: Duration::from_secs(g.request_timeout_secs),
            suspicious_threshold: g.suspicious_threshold,
            global_window: Duration::from_secs(g.global_window_secs),
            global_max_requests: g.global_max_requests,
            max_tracked_clients: g.max_tracked_clients,
        }
    }
}

fn is_http_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

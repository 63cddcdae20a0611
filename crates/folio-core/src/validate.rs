//! Contact form validation and sanitization.
//!
//! [`ContentValidator::validate`] applies, in order: presence checks, length
//! limits, the email shape check, sanitization, and a scan for dangerous
//! patterns. A pattern hit is reported as [`ValidationError::Suspicious`]
//! without saying which pattern matched.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use folio_config::ValidationConfig;

/// A contact form submission as decoded from the request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ContactRequest {
    /// Convenience constructor with every field present.
    pub fn new(name: &str, email: &str, message: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            message: Some(message.to_string()),
        }
    }
}

/// A submission that passed validation, with every field sanitized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedSubmission {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Contact form fields, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Message,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name, email and message are required")]
    MissingFields,

    #[error("{field} must be at most {max} characters")]
    TooLong { field: Field, max: usize },

    #[error("email address is not valid")]
    InvalidEmail,

    #[error("invalid input")]
    Suspicious,
}

impl ValidationError {
    /// Whether this rejection should count against the client.
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::Suspicious)
    }
}

/// Field checks, sanitization, and dangerous-pattern detection.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    limits: ValidationConfig,
    email_shape: Regex,
    script_block: Regex,
    url_scheme: Regex,
    event_handler: Regex,
    dangerous: Regex,
}

impl ContentValidator {
    /// Compile the validator's patterns.
    pub fn new(limits: ValidationConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            limits,
            email_shape: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
            script_block: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>")?,
            url_scheme: Regex::new(r"(?i)\b(?:javascript|data|vbscript):")?,
            event_handler: Regex::new(r"(?i)\bon\w+\s*=")?,
            dangerous: Regex::new(
                r"(?i)eval\s*\(|<iframe|<object|<embed|javascript:|vbscript:|data:text/html|<script",
            )?,
        })
    }

    pub fn limits(&self) -> &ValidationConfig {
        &self.limits
    }

    /// Validate and sanitize a decoded submission.
    pub fn validate(&self, req: &ContactRequest) -> Result<SanitizedSubmission, ValidationError> {
        let (Some(name), Some(email), Some(message)) =
            (present(&req.name), present(&req.email), present(&req.message))
        else {
            return Err(ValidationError::MissingFields);
        };

        check_len(Field::Name, name, self.limits.max_name_len)?;
        check_len(Field::Email, email, self.limits.max_email_len)?;
        check_len(Field::Message, message, self.limits.max_message_len)?;

        if !self.email_shape.is_match(email) {
            return Err(ValidationError::InvalidEmail);
        }

        let clean = SanitizedSubmission {
            name: self.sanitize(name, self.limits.max_name_len),
            email: self.sanitize(email, self.limits.max_email_len),
            message: self.sanitize(message, self.limits.max_message_len),
        };

        let hit = self
            .find_dangerous(&[name, email, message])
            .or_else(|| {
                self.find_dangerous(&[
                    clean.name.as_str(),
                    clean.email.as_str(),
                    clean.message.as_str(),
                ])
            });
        if let Some(pattern) = hit {
            debug!(pattern = %pattern, "Dangerous pattern in submission");
            return Err(ValidationError::Suspicious);
        }

        if clean.name.is_empty() || clean.email.is_empty() || clean.message.is_empty() {
            return Err(ValidationError::MissingFields);
        }

        Ok(clean)
    }

    /// Sanitize one field value and cap it at `max` characters.
    ///
    /// Idempotent: sanitizing the output again returns it unchanged.
    pub fn sanitize(&self, input: &str, max: usize) -> String {
        let mut current = input.trim().to_string();
        loop {
            let next = self.strip_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        let capped: String = current.chars().take(max).collect();
        capped.trim().to_string()
    }

    fn strip_once(&self, input: &str) -> String {
        let without_scripts = self.script_block.replace_all(input, "");
        let without_brackets = without_scripts.replace(['<', '>'], "");
        let without_schemes = self.url_scheme.replace_all(&without_brackets, "");
        self.event_handler
            .replace_all(&without_schemes, "")
            .into_owned()
    }

    /// The first dangerous pattern found in the joined fields, if any.
    fn find_dangerous(&self, fields: &[&str]) -> Option<String> {
        let joined = fields.join(" ");
        self.dangerous
            .find(&joined)
            .map(|m| m.as_str().to_lowercase())
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn check_len(field: Field, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

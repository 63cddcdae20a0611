//! CORS and security headers applied to every response.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";
const PREFLIGHT_MAX_AGE: &str = "86400";

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "camera=(), microphone=(), geolocation=(), interest-cohort=()",
    ),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

/// Allow-listed origins and the fixed header set.
#[derive(Debug, Clone)]
pub struct EdgeHeaders {
    allowed_origins: Vec<HeaderValue>,
}

impl EdgeHeaders {
    /// Build from configured origins. Origins that are not valid header
    /// values are dropped with a warning.
    pub fn new(origins: &[String]) -> Self {
        let allowed_origins = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring unusable allowed origin");
                    None
                }
            })
            .collect();
        Self { allowed_origins }
    }

    /// The origin to echo: the request's if allow-listed, else the first
    /// allow-listed origin.
    pub fn allow_origin(&self, request_origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        request_origin
            .and_then(|origin| self.allowed_origins.iter().find(|allowed| *allowed == origin))
            .or_else(|| self.allowed_origins.first())
            .cloned()
    }

    /// Write the CORS and security headers into `headers`.
    pub fn apply(&self, request_origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if let Some(origin) = self.allow_origin(request_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        for (name, value) in SECURITY_HEADERS {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
    }
}

/// Middleware that decorates every response leaving the router.
pub async fn edge_headers(
    State(edge): State<Arc<EdgeHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = next.run(request).await;
    edge.apply(origin.as_ref(), response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edge() -> EdgeHeaders {
        EdgeHeaders::new(&[
            "https://folio.dev".to_string(),
            "https://www.folio.dev".to_string(),
        ])
    }

    #[test]
    fn test_allow_listed_origin_is_echoed() {
        let origin = HeaderValue::from_static("https://www.folio.dev");
        assert_eq!(edge().allow_origin(Some(&origin)), Some(origin));
    }

    #[test]
    fn test_unknown_origin_falls_back_to_first() {
        let origin = HeaderValue::from_static("https://evil.example");
        assert_eq!(
            edge().allow_origin(Some(&origin)),
            Some(HeaderValue::from_static("https://folio.dev"))
        );
        assert_eq!(
            edge().allow_origin(None),
            Some(HeaderValue::from_static("https://folio.dev"))
        );
    }

    #[test]
    fn test_apply_sets_full_header_set() {
        let mut headers = HeaderMap::new();
        edge().apply(None, &mut headers);

        assert_eq!(headers["access-control-allow-origin"], "https://folio.dev");
        assert_eq!(headers["vary"], "Origin");
        assert_eq!(headers["access-control-allow-methods"], ALLOW_METHODS);
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert!(headers.contains_key("referrer-policy"));
        assert!(headers.contains_key("permissions-policy"));
        assert!(headers.contains_key("content-security-policy"));
    }

    #[test]
    fn test_unusable_origin_is_dropped() {
        let edge = EdgeHeaders::new(&["bad\norigin".to_string(), "https://ok.dev".to_string()]);
        assert_eq!(
            edge.allow_origin(None),
            Some(HeaderValue::from_static("https://ok.dev"))
        );
    }
}

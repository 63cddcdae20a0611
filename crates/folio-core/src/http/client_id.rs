//! Client identifier resolution from proxy headers.

use axum::http::HeaderMap;

/// Identifier shared by every request that carries no forwarding header.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers consulted in order; the first non-empty one wins.
const FORWARDING_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Resolve the apparent originating address of a request.
///
/// `x-forwarded-for` may list a proxy chain; only its first entry is used.
pub fn client_id(headers: &HeaderMap) -> String {
    FORWARDING_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

//! Shared request helpers.

use axum::http::HeaderMap;

/// Client IP for audit logging.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
/// Only the first hop of a forwarded chain is kept.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

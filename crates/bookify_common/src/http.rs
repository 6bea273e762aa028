// --- File: crates/bookify_common/src/http.rs ---
//! HTTP utilities shared across the feature crates.

pub mod client;

use crate::error::{BookifyError, HttpStatusCode};
use crate::rate_limit::RateLimitDecision;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// Derives the rate-limit key for a request: the first address in
/// `X-Forwarded-For` when present (we sit behind a proxy in production),
/// otherwise the peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    peer.ip().to_string()
}

/// Maps a core error to an HTTP response with its boundary status code.
pub fn error_response(err: BookifyError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.public_message()).into_response()
}

/// The 429 response for an exhausted window, carrying the reset instant.
pub fn rate_limited_response(decision: RateLimitDecision) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("x-ratelimit-reset", decision.reset_at.to_rfc3339())],
        "Rate limit exceeded".to_string(),
    )
        .into_response()
}

// --- File: crates/bookify_common/src/error.rs ---
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// The error taxonomy surfaced by the scheduling core.
///
/// Each variant corresponds to one boundary behavior; crates with richer
/// internal errors (database, calendar provider) convert into these kinds at
/// the seam where the error becomes user- or operator-visible.
#[derive(Error, Debug)]
pub enum BookifyError {
    /// Schema or semantic validation failed; never reaches the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller identity insufficient for the requested operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Event type absent or inactive, booking uid unknown
    #[error("Not found: {0}")]
    NotFound(String),

    /// Pre-commit check or uniqueness constraint rejected the slot
    #[error("Requested time slot is no longer available")]
    SlotTaken,

    /// Fixed-window limit exceeded for this client
    #[error("Rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Calendar provider error outside the token refresh path
    #[error("Upstream calendar service unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Token refresh failed; the account has been marked invalid
    #[error("Account tokens invalid: {0}")]
    TokenInvalid(String),

    /// Unclassified internal error; detail stays out of responses
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A trait for converting errors to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for BookifyError {
    fn status_code(&self) -> u16 {
        match self {
            BookifyError::InvalidInput(_) => 400,
            BookifyError::Unauthorized(_) => 401,
            BookifyError::NotFound(_) => 404,
            BookifyError::SlotTaken => 409,
            BookifyError::RateLimited { .. } => 429,
            BookifyError::UpstreamUnavailable(_) => 502,
            BookifyError::TokenInvalid(_) => 502,
            BookifyError::Internal(_) => 500,
        }
    }
}

impl BookifyError {
    /// Message safe to put in an HTTP response body. Internal detail is
    /// collapsed to a generic line.
    pub fn public_message(&self) -> String {
        match self {
            BookifyError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

// Utility constructors, mirroring how handlers assemble errors inline.
pub fn invalid_input<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::InvalidInput(message.to_string())
}

pub fn not_found<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::NotFound(message.to_string())
}

pub fn unauthorized<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::Unauthorized(message.to_string())
}

pub fn internal_error<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::Internal(message.to_string())
}

pub fn upstream_unavailable<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::UpstreamUnavailable(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_boundary_table() {
        assert_eq!(invalid_input("x").status_code(), 400);
        assert_eq!(unauthorized("x").status_code(), 401);
        assert_eq!(not_found("x").status_code(), 404);
        assert_eq!(BookifyError::SlotTaken.status_code(), 409);
        assert_eq!(
            BookifyError::RateLimited { reset_at: Utc::now() }.status_code(),
            429
        );
        assert_eq!(upstream_unavailable("x").status_code(), 502);
        assert_eq!(internal_error("x").status_code(), 500);
    }

    #[test]
    fn internal_detail_is_not_public() {
        let err = internal_error("connection string leaked");
        assert_eq!(err.public_message(), "Internal server error");
        assert!(err.to_string().contains("connection string leaked"));
    }
}

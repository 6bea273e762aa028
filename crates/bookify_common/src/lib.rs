// --- File: crates/bookify_common/src/lib.rs ---

// Declare modules within this crate
pub mod clock; // Wall-clock abstraction
pub mod error; // Error handling
pub mod http; // HTTP utilities
pub mod logging; // Logging utilities
pub mod rate_limit; // Fixed-window rate limiting
pub mod services; // Service abstractions

// Re-export error types and utilities for easier access
pub use error::{
    internal_error, invalid_input, not_found, unauthorized, upstream_unavailable, BookifyError,
    HttpStatusCode,
};

// Re-export clock types for easier access
pub use clock::{Clock, FixedClock, SystemClock};

// Re-export rate limiting types for easier access
pub use rate_limit::{EndpointClass, FixedWindowLimiter, RateLimitDecision};

// Re-export HTTP utilities for easier access
pub use http::{
    client::{create_client, HTTP_CLIENT},
    client_ip, error_response, rate_limited_response,
};

// Re-export service abstractions for easier access
pub use services::{
    BoxFuture, BoxedError, BusyBlock, BusyFetch, BusySource, CalendarApi, ExternalEvent,
    ExternalEventRef, MailMessage, Mailer, NullBusySource,
};

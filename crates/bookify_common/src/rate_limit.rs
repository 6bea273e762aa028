// --- File: crates/bookify_common/src/rate_limit.rs ---
//! Fixed-window rate limiting for the public entry points.
//!
//! The window map is the only process-wide mutable state outside the token
//! refresh locks; access is mutually excluded behind one mutex and windows
//! are evicted lazily on access.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Window length shared by all endpoint classes.
const WINDOW_SECS: i64 = 60;

/// Map size above which expired windows are swept during an access.
const EVICTION_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Booking,
    Availability,
    Oauth,
}

impl EndpointClass {
    /// Requests allowed per window.
    pub fn limit(&self) -> u32 {
        match self {
            EndpointClass::Booking => 10,
            EndpointClass::Availability => 30,
            EndpointClass::Oauth => 5,
        }
    }
}

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

#[derive(Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<(EndpointClass, String), Window>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `(class, key)` and decide whether it passes.
    pub fn check(&self, class: EndpointClass, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window_len = Duration::seconds(WINDOW_SECS);
        let mut windows = self.windows.lock().unwrap();

        if windows.len() > EVICTION_THRESHOLD {
            windows.retain(|_, w| now - w.started_at < window_len);
        }

        let window = windows
            .entry((class, key.to_string()))
            .or_insert_with(|| Window {
                started_at: now,
                count: 0,
            });

        if now - window.started_at >= window_len {
            window.started_at = now;
            window.count = 0;
        }

        let limit = class.limit();
        let reset_at = window.started_at + window_len;

        if window.count >= limit {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit - window.count,
            reset_at,
        }
    }
}

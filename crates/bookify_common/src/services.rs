// --- File: crates/bookify_common/src/services.rs ---
//! Service abstractions for external collaborators.
//!
//! These traits decouple the availability engine and the booking commit path
//! from concrete implementations, so tests can substitute stubs and the
//! backend can wire real clients at startup.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// A wrapper error type that implements std::error::Error for
/// Box<dyn std::error::Error + Send + Sync>
#[derive(Debug)]
pub struct BoxedError(pub Box<dyn StdError + Send + Sync>);

impl fmt::Display for BoxedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for BoxedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<Box<dyn StdError + Send + Sync>> for BoxedError {
    fn from(err: Box<dyn StdError + Send + Sync>) -> Self {
        BoxedError(err)
    }
}

impl BoxedError {
    pub fn new<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        BoxedError(Box::new(err))
    }

    pub fn msg<T: fmt::Display>(message: T) -> Self {
        BoxedError(message.to_string().into())
    }
}

/// A half-open busy interval `[start, end)` reported by an external calendar
/// or derived from a non-cancelled local booking. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Calendar id the block came from, or a synthetic id for ledger blocks.
    pub source: String,
}

impl BusyBlock {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            start,
            end,
            source: source.into(),
        }
    }
}

/// Result of one busy fan-out: the blocks that could be fetched plus the
/// accounts that failed to answer. Availability is fail-open over the
/// failures; the commit path re-validates.
#[derive(Debug, Clone, Default)]
pub struct BusyFetch {
    pub blocks: Vec<BusyBlock>,
    pub failed_accounts: Vec<String>,
}

/// Source of external busy intervals for one host.
pub trait BusySource: Send + Sync {
    /// Fetch busy blocks for the host's selected calendars over
    /// `[time_min, time_max)`. When `participating` is non-empty only those
    /// calendar ids are consulted. All-day periods are expanded to full local
    /// days in `host_tz`. Per-account failures are recorded in the result,
    /// never raised.
    fn busy_blocks(
        &self,
        host_id: &str,
        participating: &[String],
        host_tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BoxFuture<'_, BusyFetch, BoxedError>;
}

/// A busy source that reports nothing. Used when no calendar integration is
/// configured; local consistency still holds via the booking ledger.
pub struct NullBusySource;

impl BusySource for NullBusySource {
    fn busy_blocks(
        &self,
        _host_id: &str,
        _participating: &[String],
        _host_tz: Tz,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> BoxFuture<'_, BusyFetch, BoxedError> {
        Box::pin(async { Ok(BusyFetch::default()) })
    }
}

/// An event to be written into an external calendar after a booking commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub guest_email: String,
    pub guest_name: String,
    /// Ask the provider to attach a video conference link.
    pub request_meet_link: bool,
}

/// Reference to an event created in an external calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEventRef {
    pub event_id: String,
    pub meeting_url: Option<String>,
}

/// A trait for external calendar write and query operations, scoped to one
/// connected account per call.
pub trait CalendarApi: Send + Sync {
    /// Query free/busy for a set of calendars under one account, in a single
    /// upstream request. Date-only (all-day) periods are resolved against
    /// `host_tz`.
    fn free_busy(
        &self,
        account_id: &str,
        calendar_ids: &[String],
        host_tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BoxFuture<'_, Vec<BusyBlock>, BoxedError>;

    /// Create a calendar event; returns the provider's reference.
    fn create_event(
        &self,
        account_id: &str,
        calendar_id: &str,
        event: ExternalEvent,
    ) -> BoxFuture<'_, ExternalEventRef, BoxedError>;

    /// Move an existing event to a new time.
    fn update_event(
        &self,
        account_id: &str,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, (), BoxedError>;

    /// Delete an event. Deleting an already-gone event is not an error.
    fn delete_event(
        &self,
        account_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> BoxFuture<'_, (), BoxedError>;
}

/// An outbound email, optionally carrying an iCalendar attachment.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// iCalendar payload; the mailer attaches it as `text/calendar`.
    pub ics: Option<String>,
}

/// A trait for the mail collaborator. Send failures after a commit are
/// logged, never propagated to the guest.
pub trait Mailer: Send + Sync {
    fn send(&self, message: MailMessage) -> BoxFuture<'_, (), BoxedError>;
}

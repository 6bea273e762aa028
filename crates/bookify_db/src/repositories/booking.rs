// --- File: crates/bookify_db/src/repositories/booking.rs ---
//! Repository for the booking ledger.

use crate::error::DbError;
use crate::models::Booking;
use bookify_common::services::BoxFuture;
use chrono::{DateTime, Utc};

/// Narrow interface over booking storage.
///
/// `insert` and `reschedule` are gated by the partial unique index over
/// `(host_id, start_time, end_time)` for non-cancelled rows; a violation
/// surfaces as `DbError::Conflict` and is the serialization point for
/// concurrent commits.
pub trait BookingRepository: Send + Sync {
    /// Create the backing table and indexes if they don't exist.
    fn init_schema(&self) -> BoxFuture<'_, (), DbError>;

    /// Insert a booking inside a transaction. Returns `DbError::Conflict`
    /// when the slot tuple or the idempotency key is already taken.
    fn insert(&self, booking: Booking) -> BoxFuture<'_, Booking, DbError>;

    /// Find a booking by its public uid.
    fn find_by_uid(&self, uid: &str) -> BoxFuture<'_, Option<Booking>, DbError>;

    /// Find a booking by idempotency key.
    fn find_by_idempotency_key(&self, key: &str) -> BoxFuture<'_, Option<Booking>, DbError>;

    /// All PENDING or CONFIRMED bookings for the host whose `[start, end)`
    /// overlaps `[from, to)`.
    fn find_overlapping(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, Vec<Booking>, DbError>;

    /// Mark a booking CANCELLED. Idempotent: cancelling a cancelled booking
    /// returns it unchanged.
    fn cancel(
        &self,
        uid: &str,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> BoxFuture<'_, Booking, DbError>;

    /// Move a booking to a new time atomically, issuing a fresh uid and
    /// keeping the prior uid as a back-reference. The unique slot index
    /// gates the new time.
    fn reschedule(
        &self,
        uid: &str,
        new_uid: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, Booking, DbError>;

    /// Record the external calendar event created for a booking.
    fn set_external_ref(
        &self,
        uid: &str,
        event_id: &str,
        meeting_url: Option<String>,
    ) -> BoxFuture<'_, (), DbError>;

    /// Host-facing listing over a window, newest-first within equal starts.
    fn list_for_host(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        include_cancelled: bool,
    ) -> BoxFuture<'_, Vec<Booking>, DbError>;
}

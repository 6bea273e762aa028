// --- File: crates/bookify_db/src/repositories/event_type.rs ---
//! Repository for hosts and their event-type configurations.

use crate::error::DbError;
use crate::models::{EventType, Host};
use bookify_common::services::BoxFuture;

/// Narrow interface over host and event-type storage. Object-safe so the
/// engine can hold it behind `Arc<dyn ...>` and tests can swap the in-memory
/// implementation in.
pub trait EventTypeRepository: Send + Sync {
    /// Create the backing tables if they don't exist.
    fn init_schema(&self) -> BoxFuture<'_, (), DbError>;

    /// Insert or update a host.
    fn upsert_host(&self, host: Host) -> BoxFuture<'_, Host, DbError>;

    /// Find a host by id.
    fn find_host(&self, host_id: &str) -> BoxFuture<'_, Option<Host>, DbError>;

    /// Insert a new event type. The `(host_id, slug)` pair is unique.
    fn insert(&self, event_type: EventType) -> BoxFuture<'_, EventType, DbError>;

    /// Find an event type by id.
    fn find_by_id(&self, id: &str) -> BoxFuture<'_, Option<EventType>, DbError>;

    /// Find an event type by host and slug.
    fn find_by_slug(&self, host_id: &str, slug: &str)
        -> BoxFuture<'_, Option<EventType>, DbError>;

    /// Soft-activate or deactivate an event type. Deactivation stops new
    /// bookings without touching existing ones.
    fn set_active(&self, id: &str, active: bool) -> BoxFuture<'_, (), DbError>;
}

// --- File: crates/bookify_db/src/lib.rs ---
//! The booking ledger: database client, domain models and repositories.

pub mod client;
pub mod error;
pub mod models;
pub mod repositories;

pub use client::{DbClient, DbTransaction};
pub use error::DbError;
pub use models::{
    from_ts_string, to_ts_string, Booking, BookingStatus, CalendarRecord, ConnectedAccount,
    EventType, Host, LocationKind, Question, WorkingHours,
};
pub use repositories::{
    AccountRepository, BookingRepository, BusyTarget, EventTypeRepository,
    InMemoryAccountRepository, InMemoryBookingRepository, InMemoryEventTypeRepository,
    SqlAccountRepository, SqlBookingRepository, SqlEventTypeRepository,
};

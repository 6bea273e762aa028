// --- File: crates/bookify_db/src/repositories/mod.rs ---
//! Repositories over the booking ledger.

pub mod account;
pub mod account_sql;
pub mod booking;
pub mod booking_sql;
pub mod event_type;
pub mod event_type_sql;
pub mod memory;

pub use account::{AccountRepository, BusyTarget};
pub use account_sql::SqlAccountRepository;
pub use booking::BookingRepository;
pub use booking_sql::SqlBookingRepository;
pub use event_type::EventTypeRepository;
pub use event_type_sql::SqlEventTypeRepository;
pub use memory::{InMemoryAccountRepository, InMemoryBookingRepository, InMemoryEventTypeRepository};

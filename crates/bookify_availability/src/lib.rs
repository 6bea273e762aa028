// --- File: crates/bookify_availability/src/lib.rs ---
// Declare modules within this crate
pub mod handlers;
pub mod interval;
pub mod logic;
pub mod routes;
pub mod tz;
mod interval_test;

pub use interval::Slot;
pub use logic::{AvailabilityEngine, SlotsByDay, LEDGER_SOURCE};

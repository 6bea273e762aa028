// --- File: crates/bookify_db/src/repositories/account.rs ---
//! Repository for connected accounts and their calendars.

use crate::error::DbError;
use crate::models::{CalendarRecord, ConnectedAccount};
use bookify_common::services::BoxFuture;
use chrono::{DateTime, Utc};

/// One account plus the calendars consulted for busy blocks. The provider
/// coalesces each target's calendars into a single upstream request.
#[derive(Debug, Clone)]
pub struct BusyTarget {
    pub account: ConnectedAccount,
    pub calendars: Vec<CalendarRecord>,
}

/// Narrow interface over connected-account and calendar storage.
pub trait AccountRepository: Send + Sync {
    /// Create the backing tables if they don't exist.
    fn init_schema(&self) -> BoxFuture<'_, (), DbError>;

    /// Insert or update a connected account (OAuth upsert).
    fn upsert_account(
        &self,
        account: ConnectedAccount,
    ) -> BoxFuture<'_, ConnectedAccount, DbError>;

    /// Find a connected account by id.
    fn find_by_id(&self, id: &str) -> BoxFuture<'_, Option<ConnectedAccount>, DbError>;

    /// Flip an account invalid after a refresh failure. Invalid accounts are
    /// excluded from busy targets until re-consent.
    fn mark_invalid(&self, id: &str) -> BoxFuture<'_, (), DbError>;

    /// Persist freshly refreshed tokens (already sealed by the vault) and
    /// bump `last_sync_at`. Called before any request uses the new token.
    fn update_tokens(
        &self,
        id: &str,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, (), DbError>;

    /// Insert or update a calendar reconciled from the provider. The
    /// `(account_id, external_calendar_id)` pair is unique.
    fn upsert_calendar(
        &self,
        calendar: CalendarRecord,
    ) -> BoxFuture<'_, CalendarRecord, DbError>;

    /// Valid accounts of the host, each with its busy-selected calendars.
    /// Accounts without selected calendars are omitted.
    fn busy_targets(&self, host_id: &str) -> BoxFuture<'_, Vec<BusyTarget>, DbError>;

    /// Resolve a calendar record id to the calendar and its owning account,
    /// for external event writes.
    fn calendar_with_account(
        &self,
        calendar_id: &str,
    ) -> BoxFuture<'_, Option<(ConnectedAccount, CalendarRecord)>, DbError>;
}

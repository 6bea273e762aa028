// --- File: crates/bookify_db/src/repositories/memory.rs ---
//! In-memory repository implementations.
//!
//! These back the engine and commit-path tests, enforcing the same
//! uniqueness semantics as the SQL schema: at most one non-cancelled booking
//! per `(host, start, end)` and globally unique idempotency keys.

use crate::error::DbError;
use crate::models::{Booking, BookingStatus, CalendarRecord, ConnectedAccount, EventType, Host};
use crate::repositories::account::{AccountRepository, BusyTarget};
use crate::repositories::booking::BookingRepository;
use crate::repositories::event_type::EventTypeRepository;
use bookify_common::services::BoxFuture;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryEventTypeRepository {
    hosts: Mutex<HashMap<String, Host>>,
    event_types: Mutex<HashMap<String, EventType>>,
}

impl InMemoryEventTypeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventTypeRepository for InMemoryEventTypeRepository {
    fn init_schema(&self) -> BoxFuture<'_, (), DbError> {
        Box::pin(async { Ok(()) })
    }

    fn upsert_host(&self, host: Host) -> BoxFuture<'_, Host, DbError> {
        Box::pin(async move {
            self.hosts
                .lock()
                .unwrap()
                .insert(host.id.clone(), host.clone());
            Ok(host)
        })
    }

    fn find_host(&self, host_id: &str) -> BoxFuture<'_, Option<Host>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move { Ok(self.hosts.lock().unwrap().get(&host_id).cloned()) })
    }

    fn insert(&self, event_type: EventType) -> BoxFuture<'_, EventType, DbError> {
        Box::pin(async move {
            event_type.validate()?;
            let mut event_types = self.event_types.lock().unwrap();
            let slug_taken = event_types.values().any(|et| {
                et.host_id == event_type.host_id && et.slug == event_type.slug
            });
            if slug_taken {
                return Err(DbError::Conflict(format!(
                    "slug '{}' already exists for host {}",
                    event_type.slug, event_type.host_id
                )));
            }
            event_types.insert(event_type.id.clone(), event_type.clone());
            Ok(event_type)
        })
    }

    fn find_by_id(&self, id: &str) -> BoxFuture<'_, Option<EventType>, DbError> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.event_types.lock().unwrap().get(&id).cloned()) })
    }

    fn find_by_slug(
        &self,
        host_id: &str,
        slug: &str,
    ) -> BoxFuture<'_, Option<EventType>, DbError> {
        let host_id = host_id.to_string();
        let slug = slug.to_string();
        Box::pin(async move {
            Ok(self
                .event_types
                .lock()
                .unwrap()
                .values()
                .find(|et| et.host_id == host_id && et.slug == slug)
                .cloned())
        })
    }

    fn set_active(&self, id: &str, active: bool) -> BoxFuture<'_, (), DbError> {
        let id = id.to_string();
        Box::pin(async move {
            let mut event_types = self.event_types.lock().unwrap();
            match event_types.get_mut(&id) {
                Some(et) => {
                    et.active = active;
                    Ok(())
                }
                None => Err(DbError::NotFound(format!("event type {}", id))),
            }
        })
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: Mutex<Vec<Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: a snapshot of every stored row.
    pub fn all(&self) -> Vec<Booking> {
        self.bookings.lock().unwrap().clone()
    }
}

fn slot_conflict(existing: &Booking, candidate: &Booking) -> bool {
    existing.status != BookingStatus::Cancelled
        && existing.host_id == candidate.host_id
        && existing.start_time == candidate.start_time
        && existing.end_time == candidate.end_time
}

impl BookingRepository for InMemoryBookingRepository {
    fn init_schema(&self) -> BoxFuture<'_, (), DbError> {
        Box::pin(async { Ok(()) })
    }

    fn insert(&self, mut booking: Booking) -> BoxFuture<'_, Booking, DbError> {
        Box::pin(async move {
            let mut bookings = self.bookings.lock().unwrap();

            if bookings.iter().any(|b| slot_conflict(b, &booking)) {
                return Err(DbError::Conflict(
                    "UNIQUE constraint failed: bookings.host_id, bookings.start_time, bookings.end_time"
                        .to_string(),
                ));
            }
            if let Some(key) = &booking.idempotency_key {
                if bookings
                    .iter()
                    .any(|b| b.idempotency_key.as_deref() == Some(key))
                {
                    return Err(DbError::Conflict(
                        "UNIQUE constraint failed: bookings.idempotency_key".to_string(),
                    ));
                }
            }

            booking.id = Some(bookings.len() as i64 + 1);
            bookings.push(booking.clone());
            Ok(booking)
        })
    }

    fn find_by_uid(&self, uid: &str) -> BoxFuture<'_, Option<Booking>, DbError> {
        let uid = uid.to_string();
        Box::pin(async move {
            Ok(self
                .bookings
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.uid == uid)
                .cloned())
        })
    }

    fn find_by_idempotency_key(&self, key: &str) -> BoxFuture<'_, Option<Booking>, DbError> {
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .bookings
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.idempotency_key.as_deref() == Some(&key))
                .cloned())
        })
    }

    fn find_overlapping(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, Vec<Booking>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let mut found: Vec<Booking> = self
                .bookings
                .lock()
                .unwrap()
                .iter()
                .filter(|b| {
                    b.host_id == host_id
                        && b.status.blocks_slot()
                        && b.start_time < to
                        && b.end_time > from
                })
                .cloned()
                .collect();
            found.sort_by_key(|b| b.start_time);
            Ok(found)
        })
    }

    fn cancel(
        &self,
        uid: &str,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> BoxFuture<'_, Booking, DbError> {
        let uid = uid.to_string();
        Box::pin(async move {
            let mut bookings = self.bookings.lock().unwrap();
            let booking = bookings
                .iter_mut()
                .find(|b| b.uid == uid)
                .ok_or_else(|| DbError::NotFound(format!("booking {}", uid)))?;

            if booking.status != BookingStatus::Cancelled {
                booking.status = BookingStatus::Cancelled;
                booking.cancelled_at = Some(at);
                booking.cancel_reason = reason;
            }
            Ok(booking.clone())
        })
    }

    fn reschedule(
        &self,
        uid: &str,
        new_uid: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, Booking, DbError> {
        let uid = uid.to_string();
        let new_uid = new_uid.to_string();
        Box::pin(async move {
            let mut bookings = self.bookings.lock().unwrap();

            let taken = bookings.iter().any(|b| {
                b.uid != uid
                    && b.status != BookingStatus::Cancelled
                    && b.start_time == start
                    && b.end_time == end
                    && bookings
                        .iter()
                        .find(|c| c.uid == uid)
                        .map(|c| c.host_id == b.host_id)
                        .unwrap_or(false)
            });
            if taken {
                return Err(DbError::Conflict(
                    "UNIQUE constraint failed: bookings.host_id, bookings.start_time, bookings.end_time"
                        .to_string(),
                ));
            }

            let booking = bookings
                .iter_mut()
                .find(|b| b.uid == uid && b.status != BookingStatus::Cancelled)
                .ok_or_else(|| DbError::NotFound(format!("booking {}", uid)))?;

            booking.rescheduled_from_uid = Some(booking.uid.clone());
            booking.uid = new_uid;
            booking.start_time = start;
            booking.end_time = end;
            Ok(booking.clone())
        })
    }

    fn set_external_ref(
        &self,
        uid: &str,
        event_id: &str,
        meeting_url: Option<String>,
    ) -> BoxFuture<'_, (), DbError> {
        let uid = uid.to_string();
        let event_id = event_id.to_string();
        Box::pin(async move {
            let mut bookings = self.bookings.lock().unwrap();
            if let Some(booking) = bookings.iter_mut().find(|b| b.uid == uid) {
                booking.external_event_id = Some(event_id);
                booking.meeting_url = meeting_url;
            }
            Ok(())
        })
    }

    fn list_for_host(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        include_cancelled: bool,
    ) -> BoxFuture<'_, Vec<Booking>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let mut found: Vec<Booking> = self
                .bookings
                .lock()
                .unwrap()
                .iter()
                .filter(|b| {
                    b.host_id == host_id
                        && b.start_time < to
                        && b.end_time > from
                        && (include_cancelled || b.status != BookingStatus::Cancelled)
                })
                .cloned()
                .collect();
            found.sort_by_key(|b| b.start_time);
            Ok(found)
        })
    }
}

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: Mutex<HashMap<String, ConnectedAccount>>,
    calendars: Mutex<HashMap<String, CalendarRecord>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountRepository for InMemoryAccountRepository {
    fn init_schema(&self) -> BoxFuture<'_, (), DbError> {
        Box::pin(async { Ok(()) })
    }

    fn upsert_account(
        &self,
        account: ConnectedAccount,
    ) -> BoxFuture<'_, ConnectedAccount, DbError> {
        Box::pin(async move {
            self.accounts
                .lock()
                .unwrap()
                .insert(account.id.clone(), account.clone());
            Ok(account)
        })
    }

    fn find_by_id(&self, id: &str) -> BoxFuture<'_, Option<ConnectedAccount>, DbError> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.accounts.lock().unwrap().get(&id).cloned()) })
    }

    fn mark_invalid(&self, id: &str) -> BoxFuture<'_, (), DbError> {
        let id = id.to_string();
        Box::pin(async move {
            if let Some(account) = self.accounts.lock().unwrap().get_mut(&id) {
                account.is_valid = false;
            }
            Ok(())
        })
    }

    fn update_tokens(
        &self,
        id: &str,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, (), DbError> {
        let id = id.to_string();
        let access_token_enc = access_token_enc.to_string();
        let refresh_token_enc = refresh_token_enc.map(|s| s.to_string());
        Box::pin(async move {
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(&id)
                .ok_or_else(|| DbError::NotFound(format!("account {}", id)))?;
            account.access_token_enc = Some(access_token_enc);
            if let Some(refresh) = refresh_token_enc {
                account.refresh_token_enc = Some(refresh);
            }
            account.token_expires_at = Some(expires_at);
            account.last_sync_at = Some(now);
            account.is_valid = true;
            Ok(())
        })
    }

    fn upsert_calendar(&self, calendar: CalendarRecord) -> BoxFuture<'_, CalendarRecord, DbError> {
        Box::pin(async move {
            self.calendars
                .lock()
                .unwrap()
                .insert(calendar.id.clone(), calendar.clone());
            Ok(calendar)
        })
    }

    fn busy_targets(&self, host_id: &str) -> BoxFuture<'_, Vec<BusyTarget>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let accounts = self.accounts.lock().unwrap();
            let calendars = self.calendars.lock().unwrap();

            let mut targets: Vec<BusyTarget> = accounts
                .values()
                .filter(|a| a.host_id == host_id && a.is_valid)
                .map(|account| {
                    let mut cals: Vec<CalendarRecord> = calendars
                        .values()
                        .filter(|c| c.account_id == account.id && c.selected_for_busy)
                        .cloned()
                        .collect();
                    cals.sort_by(|a, b| a.id.cmp(&b.id));
                    BusyTarget {
                        account: account.clone(),
                        calendars: cals,
                    }
                })
                .filter(|t| !t.calendars.is_empty())
                .collect();
            targets.sort_by(|a, b| a.account.id.cmp(&b.account.id));
            Ok(targets)
        })
    }

    fn calendar_with_account(
        &self,
        calendar_id: &str,
    ) -> BoxFuture<'_, Option<(ConnectedAccount, CalendarRecord)>, DbError> {
        let calendar_id = calendar_id.to_string();
        Box::pin(async move {
            let calendars = self.calendars.lock().unwrap();
            let accounts = self.accounts.lock().unwrap();
            let calendar = match calendars.get(&calendar_id) {
                Some(c) => c.clone(),
                None => return Ok(None),
            };
            Ok(accounts
                .get(&calendar.account_id)
                .map(|a| (a.clone(), calendar)))
        })
    }
}

// --- File: crates/bookify_availability/src/logic.rs ---
//! The availability engine.
//!
//! Composes the clock, the timezone resolver, the busy source and the
//! booking ledger into the two operations the HTTP surface and the commit
//! path consume: `list_slots` and `is_slot_bookable`. The engine holds no
//! cross-request state; every call takes a fresh snapshot.

use crate::interval::{self, Slot};
use crate::tz;
use bookify_common::services::{BusyBlock, BusySource};
use bookify_common::{internal_error, not_found, BookifyError, Clock};
use bookify_db::{BookingRepository, EventType, EventTypeRepository, Host};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Synthetic source id for busy blocks derived from the local ledger.
pub const LEDGER_SOURCE: &str = "ledger";

/// Slots grouped by local date in the guest timezone, ascending by start
/// within each day. `BTreeMap` keeps day ordering stable across calls.
pub type SlotsByDay = BTreeMap<NaiveDate, Vec<Slot>>;

#[derive(Clone)]
pub struct AvailabilityEngine {
    event_types: Arc<dyn EventTypeRepository>,
    bookings: Arc<dyn BookingRepository>,
    busy: Arc<dyn BusySource>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityEngine {
    pub fn new(
        event_types: Arc<dyn EventTypeRepository>,
        bookings: Arc<dyn BookingRepository>,
        busy: Arc<dyn BusySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            event_types,
            bookings,
            busy,
            clock,
        }
    }

    /// Loads an active event type together with its host and the host's
    /// parsed timezone. Inactive and missing event types are both 404s, so
    /// deactivation is indistinguishable from deletion for guests.
    pub async fn load_active_event_type(
        &self,
        event_type_id: &str,
    ) -> Result<(EventType, Host, Tz), BookifyError> {
        let event_type = self
            .event_types
            .find_by_id(event_type_id)
            .await?
            .ok_or_else(|| not_found(format!("event type {}", event_type_id)))?;

        if !event_type.active {
            return Err(not_found(format!("event type {}", event_type_id)));
        }

        let host = self
            .event_types
            .find_host(&event_type.host_id)
            .await?
            .ok_or_else(|| not_found(format!("host {}", event_type.host_id)))?;

        let host_tz: Tz = host
            .display_timezone
            .parse()
            .map_err(|_| internal_error(format!("invalid host timezone '{}'", host.display_timezone)))?;

        Ok((event_type, host, host_tz))
    }

    /// Lists bookable slots over `[range_start, range_end)`, grouped by
    /// local date in the guest timezone.
    pub async fn list_slots(
        &self,
        event_type_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        guest_tz: Tz,
    ) -> Result<SlotsByDay, BookifyError> {
        let (event_type, _host, host_tz) = self.load_active_event_type(event_type_id).await?;

        // Effective window: the request clipped to notice and window bounds.
        let now = self.clock.now();
        let notice = Duration::minutes(event_type.minimum_notice_minutes);
        let window_end = now + Duration::days(event_type.scheduling_window_days);
        let effective_start = range_start.max(now + notice);
        let effective_end = range_end.min(window_end);
        if effective_start >= effective_end {
            return Ok(SlotsByDay::new());
        }

        let buffer_before = Duration::minutes(event_type.buffer_before_minutes);
        let buffer_after = Duration::minutes(event_type.buffer_after_minutes);

        // Busy blocks just outside the window still collide with edge slots
        // once buffers are applied, so the fetch window is widened.
        let fetch_start = effective_start - buffer_before;
        let fetch_end = effective_end + buffer_after;

        // Snapshot both sources in parallel. The two reads need not be
        // mutually consistent; the pre-commit check re-validates.
        let (busy_result, ledger_result) = tokio::join!(
            self.busy.busy_blocks(
                &event_type.host_id,
                &event_type.participating_calendars,
                host_tz,
                fetch_start,
                fetch_end,
            ),
            self.bookings
                .find_overlapping(&event_type.host_id, fetch_start, fetch_end),
        );

        // Fail-open on the external side: a dead provider must not blank
        // the host's calendar page.
        let mut blocks = match busy_result {
            Ok(fetch) => {
                if !fetch.failed_accounts.is_empty() {
                    warn!(
                        "Availability computed without accounts {:?} for host {}",
                        fetch.failed_accounts, event_type.host_id
                    );
                }
                fetch.blocks
            }
            Err(e) => {
                warn!("Busy fetch failed for host {}: {}", event_type.host_id, e);
                Vec::new()
            }
        };

        for booking in ledger_result? {
            blocks.push(BusyBlock::new(
                booking.start_time,
                booking.end_time,
                LEDGER_SOURCE,
            ));
        }
        let merged = interval::merge(blocks);

        debug!(
            "Listing slots for {} between {} and {} against {} busy blocks",
            event_type_id,
            effective_start,
            effective_end,
            merged.len()
        );

        // Walk each local day of the window in the host timezone.
        let mut days = SlotsByDay::new();
        let mut day = tz::to_local_wall(effective_start, host_tz).date();
        let last_day = tz::to_local_wall(effective_end, host_tz).date();
        while day <= last_day {
            for slot in interval::enumerate_day(
                day,
                &event_type.working_hours,
                event_type.duration_minutes,
                event_type.slot_interval_minutes,
                host_tz,
            ) {
                if slot.start < effective_start || slot.end > effective_end {
                    continue;
                }
                if interval::overlaps(&slot, &merged, buffer_before, buffer_after) {
                    continue;
                }
                let guest_day = tz::to_local_wall(slot.start, guest_tz).date();
                days.entry(guest_day).or_default().push(slot);
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(days)
    }

    /// The pre-commit check: recomputes every condition for a single start
    /// instant against fresh data.
    pub async fn is_slot_bookable(
        &self,
        event_type_id: &str,
        start: DateTime<Utc>,
    ) -> Result<bool, BookifyError> {
        let (event_type, _host, host_tz) = self.load_active_event_type(event_type_id).await?;
        self.slot_is_open(&event_type, host_tz, start).await
    }

    /// Same check with the event type already loaded; the commit path uses
    /// this to avoid a second lookup.
    pub async fn slot_is_open(
        &self,
        event_type: &EventType,
        host_tz: Tz,
        start: DateTime<Utc>,
    ) -> Result<bool, BookifyError> {
        self.slot_is_open_excluding(event_type, host_tz, start, None)
            .await
    }

    /// Pre-commit check that ignores one booking uid in the ledger: a
    /// reschedule must not collide with the row it is about to move.
    pub async fn slot_is_open_excluding(
        &self,
        event_type: &EventType,
        host_tz: Tz,
        start: DateTime<Utc>,
        exclude_uid: Option<&str>,
    ) -> Result<bool, BookifyError> {
        let now = self.clock.now();
        let end = start + Duration::minutes(event_type.duration_minutes);

        if start < now + Duration::minutes(event_type.minimum_notice_minutes) {
            return Ok(false);
        }
        if start > now + Duration::days(event_type.scheduling_window_days) {
            return Ok(false);
        }

        // Working-hours containment and interval alignment, in host local
        // time. The round-trip guard rejects instants whose wall time maps
        // back differently (the later half of a DST fold).
        let local = tz::to_local_wall(start, host_tz);
        match tz::to_instant(local, host_tz) {
            Some(instant) if instant == start => {}
            _ => return Ok(false),
        }
        if local.second() != 0 || local.nanosecond() != 0 {
            return Ok(false);
        }

        let minute_of_day = local.hour() * 60 + local.minute();
        let day_of_week = local.date().weekday().num_days_from_sunday() as u8;
        let duration = event_type.duration_minutes.max(0) as u32;
        let interval = event_type.slot_interval_minutes.max(1) as u32;

        let inside_hours = event_type.working_hours.iter().any(|rule| {
            rule.day_of_week == day_of_week
                && match (rule.start_minutes(), rule.end_minutes()) {
                    (Some(rule_start), Some(rule_end)) => {
                        minute_of_day >= rule_start
                            && minute_of_day + duration <= rule_end
                            && (minute_of_day - rule_start) % interval == 0
                    }
                    _ => false,
                }
        });
        if !inside_hours {
            return Ok(false);
        }

        let buffer_before = Duration::minutes(event_type.buffer_before_minutes);
        let buffer_after = Duration::minutes(event_type.buffer_after_minutes);

        // Fresh external busy fetch covering exactly the buffered span.
        let busy = self
            .busy
            .busy_blocks(
                &event_type.host_id,
                &event_type.participating_calendars,
                host_tz,
                start - buffer_before,
                end + buffer_after,
            )
            .await;
        let blocks = match busy {
            Ok(fetch) => fetch.blocks,
            Err(e) => {
                warn!(
                    "Busy fetch failed during pre-commit check for host {}: {}",
                    event_type.host_id, e
                );
                Vec::new()
            }
        };

        let slot = Slot { start, end };
        if interval::overlaps(&slot, &blocks, buffer_before, buffer_after) {
            return Ok(false);
        }

        // The ledger check is buffer-free: buffers shape what is offered,
        // the ledger constraint protects the slot itself.
        let local_bookings = self
            .bookings
            .find_overlapping(&event_type.host_id, start, end)
            .await?;

        Ok(local_bookings
            .iter()
            .all(|b| Some(b.uid.as_str()) == exclude_uid))
    }
}

// --- File: crates/bookify_availability/src/interval.rs ---
//! Pure interval algebra over half-open `[start, end)` intervals.
//! No I/O, no clock; everything the slot filter needs is a parameter.

use crate::tz;
use bookify_common::services::BusyBlock;
use chrono::{Datelike, DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use bookify_db::WorkingHours;

/// A bookable candidate: `[start, start + duration)`, aligned to a multiple
/// of the slot interval from the day's working start in host local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Coalesces intervals into a sorted, pairwise-disjoint set covering the
/// same union. Adjacent intervals (`a.end == b.start`) merge.
pub fn merge(mut blocks: Vec<BusyBlock>) -> Vec<BusyBlock> {
    blocks.sort_by_key(|b| b.start);
    let mut merged: Vec<BusyBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(last) if block.start <= last.end => {
                if block.end > last.end {
                    last.end = block.end;
                }
            }
            _ => merged.push(block),
        }
    }
    merged
}

/// Whether the buffer-expanded slot `[start - before, end + after)` has a
/// non-empty intersection with any block. With zero buffers a block ending
/// exactly at the slot start does not conflict.
pub fn overlaps(
    slot: &Slot,
    blocks: &[BusyBlock],
    buffer_before: Duration,
    buffer_after: Duration,
) -> bool {
    let expanded_start = slot.start - buffer_before;
    let expanded_end = slot.end + buffer_after;
    blocks
        .iter()
        .any(|b| b.start < expanded_end && b.end > expanded_start)
}

/// Enumerates candidate slots for one local day. Starts walk in
/// `interval_minutes` steps from each rule's working start; a slot is kept
/// only when it ends at or before the rule's working end. Local times
/// erased by a DST gap are skipped; folded times take the earlier instant.
pub fn enumerate_day(
    date: NaiveDate,
    working_hours: &[WorkingHours],
    duration_minutes: i64,
    interval_minutes: i64,
    host_tz: Tz,
) -> Vec<Slot> {
    let duration = duration_minutes.max(0) as u32;
    let interval = interval_minutes.max(1) as u32;
    let day_of_week = date.weekday().num_days_from_sunday() as u8;

    let mut slots = Vec::new();
    for rule in working_hours.iter().filter(|r| r.day_of_week == day_of_week) {
        let (start_minutes, end_minutes) = match (rule.start_minutes(), rule.end_minutes()) {
            (Some(s), Some(e)) => (s, e),
            _ => continue,
        };

        let mut minute = start_minutes;
        while minute + duration <= end_minutes {
            let time = NaiveTime::from_num_seconds_from_midnight_opt(minute * 60, 0)
                .expect("minutes within a day");
            if let Some(start) = tz::to_instant(date.and_time(time), host_tz) {
                slots.push(Slot {
                    start,
                    end: start + Duration::minutes(duration_minutes),
                });
            }
            minute += interval;
        }
    }

    slots.sort_by_key(|s| s.start);
    slots.dedup_by_key(|s| s.start);
    slots
}

// --- File: crates/bookify_availability/src/tz.rs ---
//! The one place DST semantics live.
//!
//! Local wall-clock times that don't exist (spring-forward gap) resolve to
//! `None`; ambiguous ones (fall-back fold) resolve to the earlier instant.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Converts a local wall-clock time in `tz` to an instant.
pub fn to_instant(local: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _latest) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Converts an instant to the local wall-clock time in `tz`.
pub fn to_local_wall(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}

/// Whether the local wall-clock time exists in `tz`.
pub fn is_valid_local(local: NaiveDateTime, tz: Tz) -> bool {
    !matches!(tz.from_local_datetime(&local), LocalResult::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_york() -> Tz {
        "America/New_York".parse().unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn plain_local_time_round_trips() {
        let tz = new_york();
        let instant = to_instant(local(2024, 1, 15, 9, 0), tz).unwrap();
        // 09:00 EST is 14:00 UTC
        assert_eq!(instant.to_rfc3339(), "2024-01-15T14:00:00+00:00");
        assert_eq!(to_local_wall(instant, tz), local(2024, 1, 15, 9, 0));
    }

    #[test]
    fn spring_forward_gap_does_not_exist() {
        let tz = new_york();
        // 2024-03-10 02:30 never happens in New York
        assert!(to_instant(local(2024, 3, 10, 2, 30), tz).is_none());
        assert!(!is_valid_local(local(2024, 3, 10, 2, 30), tz));
        assert!(is_valid_local(local(2024, 3, 10, 3, 0), tz));
    }

    #[test]
    fn fall_back_fold_resolves_to_earlier_instant() {
        let tz = new_york();
        // 2024-11-03 01:30 happens twice; the earlier one is still EDT (UTC-4)
        let instant = to_instant(local(2024, 11, 3, 1, 30), tz).unwrap();
        assert_eq!(instant.to_rfc3339(), "2024-11-03T05:30:00+00:00");
    }
}

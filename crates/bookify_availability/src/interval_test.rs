#[cfg(test)]
mod tests {
    use crate::interval::{enumerate_day, merge, overlaps, Slot};
    use bookify_common::services::BusyBlock;
    use bookify_db::WorkingHours;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;

    fn at(h: u32, m: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
    }

    fn block(start_h: u32, start_m: u32, end_h: u32, end_m: u32) -> BusyBlock {
        BusyBlock::new(at(start_h, start_m), at(end_h, end_m), "cal")
    }

    fn hours(day: u8, start: &str, end: &str) -> WorkingHours {
        WorkingHours {
            day_of_week: day,
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    #[test]
    fn merge_coalesces_overlapping_blocks() {
        let merged = merge(vec![block(13, 0, 14, 0), block(13, 30, 15, 0), block(9, 0, 10, 0)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start, at(9, 0));
        assert_eq!(merged[0].end, at(10, 0));
        assert_eq!(merged[1].start, at(13, 0));
        assert_eq!(merged[1].end, at(15, 0));
    }

    #[test]
    fn merge_coalesces_adjacent_blocks() {
        let merged = merge(vec![block(10, 0, 11, 0), block(11, 0, 12, 0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, at(10, 0));
        assert_eq!(merged[0].end, at(12, 0));
    }

    #[test]
    fn merge_keeps_disjoint_blocks_sorted() {
        let merged = merge(vec![block(14, 0, 15, 0), block(10, 0, 11, 0)]);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].start < merged[1].start);
        assert!(merged[0].end < merged[1].start);
    }

    #[test]
    fn zero_buffer_adjacency_does_not_conflict() {
        // Busy until 11:00; a slot starting exactly at 11:00 is free
        let blocks = vec![block(10, 0, 11, 0)];
        let slot = Slot {
            start: at(11, 0),
            end: at(11, 30),
        };
        assert!(!overlaps(&slot, &blocks, Duration::zero(), Duration::zero()));

        // The symmetric case: slot ending exactly where the block starts
        let slot = Slot {
            start: at(9, 30),
            end: at(10, 0),
        };
        assert!(!overlaps(&slot, &blocks, Duration::zero(), Duration::zero()));
    }

    #[test]
    fn buffer_before_expands_the_conflict_window() {
        let blocks = vec![block(10, 0, 11, 0)];

        // With a 15-minute lead buffer, 11:00 collides (expanded start 10:45)
        let slot = Slot {
            start: at(11, 0),
            end: at(11, 30),
        };
        assert!(overlaps(&slot, &blocks, Duration::minutes(15), Duration::zero()));

        // 11:15 clears the buffer
        let slot = Slot {
            start: at(11, 15),
            end: at(11, 45),
        };
        assert!(!overlaps(&slot, &blocks, Duration::minutes(15), Duration::zero()));
    }

    #[test]
    fn buffer_after_guards_the_tail() {
        let blocks = vec![block(12, 0, 13, 0)];
        let slot = Slot {
            start: at(11, 0),
            end: at(11, 50),
        };
        assert!(!overlaps(&slot, &blocks, Duration::zero(), Duration::zero()));
        assert!(overlaps(&slot, &blocks, Duration::zero(), Duration::minutes(15)));
    }

    #[test]
    fn enumerate_day_walks_interval_steps_within_hours() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(); // Monday
        let rules = vec![hours(1, "09:00", "10:00")];
        let slots = enumerate_day(date, &rules, 30, 15, Tz::UTC);

        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(9, 0), at(9, 15), at(9, 30)]);
        // Every slot ends at or before the working end
        assert!(slots.iter().all(|s| s.end <= at(10, 0)));
    }

    #[test]
    fn enumerate_day_skips_non_working_days() {
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let rules = vec![hours(1, "09:00", "17:00")]; // Monday only
        assert!(enumerate_day(sunday, &rules, 30, 15, Tz::UTC).is_empty());
    }

    #[test]
    fn enumerate_day_merges_multiple_rules_for_one_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let rules = vec![hours(1, "09:00", "10:00"), hours(1, "14:00", "15:00")];
        let slots = enumerate_day(date, &rules, 60, 15, Tz::UTC);
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(9, 0), at(14, 0)]);
    }

    #[test]
    fn spring_forward_gap_slots_are_skipped() {
        // New York, 2024-03-10: 02:00-03:00 local does not exist
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(); // Sunday
        let rules = vec![hours(0, "01:00", "04:00")];
        let slots = enumerate_day(date, &rules, 30, 30, tz);

        // Candidates: 01:00, 01:30, 02:00*, 02:30*, 03:00, 03:30
        // The starred wall times don't exist and are dropped.
        assert_eq!(slots.len(), 4);
        // 01:00 EST = 06:00 UTC, and 03:00 EDT = 07:00 UTC right after the jump
        assert_eq!(
            slots[0].start,
            Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
        );
        assert_eq!(
            slots[2].start,
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn fall_back_fold_resolves_to_earlier_instant() {
        // New York, 2024-11-03: 01:00-02:00 local happens twice
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(); // Sunday
        let rules = vec![hours(0, "01:00", "02:00")];
        let slots = enumerate_day(date, &rules, 30, 30, tz);

        assert_eq!(slots.len(), 2);
        // 01:00 EDT = 05:00 UTC (the earlier of the two 01:00s)
        assert_eq!(
            slots[0].start,
            Utc.with_ymd_and_hms(2024, 11, 3, 5, 0, 0).unwrap()
        );
    }
}

//! Property tests for the period boundary calculator.

use chrono::{Duration, TimeZone, Utc, Weekday};
use proptest::prelude::*;

use closeout_pipeline::interval::{period_start, RotationSchedule};
use closeout_pipeline::model::IntervalKind;

fn weekday(index: u8) -> Weekday {
    match index % 7 {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

const INTERVALS: [IntervalKind; 4] = [
    IntervalKind::Daily,
    IntervalKind::Weekly,
    IntervalKind::Monthly,
    IntervalKind::Unlimited,
];

prop_compose! {
    fn any_schedule()(
        daily_minute in any::<u16>(),
        weekly_minute in any::<u16>(),
        weekly_day in any::<u8>(),
        monthly_minute in any::<u16>(),
        monthly_day in any::<u8>(),
    ) -> RotationSchedule {
        RotationSchedule {
            daily_minute,
            weekly_minute,
            weekly_day: weekday(weekly_day),
            monthly_minute,
            monthly_day,
        }
    }
}

proptest! {
    // Timestamps span 2000-01-01 to 2100-01-01.
    #[test]
    fn boundary_is_never_in_the_future(
        secs in 946_684_800i64..4_102_444_800i64,
        schedule in any_schedule(),
        interval_index in 0usize..4,
    ) {
        let now = Utc.timestamp_opt(secs, 0).single().unwrap();
        let interval = INTERVALS[interval_index];
        let start = period_start(now, interval, &schedule);
        prop_assert!(start <= now, "start {start} is after now {now}");
    }

    #[test]
    fn boundary_is_deterministic(
        secs in 946_684_800i64..4_102_444_800i64,
        schedule in any_schedule(),
        interval_index in 0usize..4,
    ) {
        let now = Utc.timestamp_opt(secs, 0).single().unwrap();
        let interval = INTERVALS[interval_index];
        let a = period_start(now, interval, &schedule);
        let b = period_start(now, interval, &schedule);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn daily_boundary_is_within_the_last_day(
        secs in 946_684_800i64..4_102_444_800i64,
        schedule in any_schedule(),
    ) {
        let now = Utc.timestamp_opt(secs, 0).single().unwrap();
        let start = period_start(now, IntervalKind::Daily, &schedule);
        prop_assert!(now - start < Duration::hours(24));
    }

    #[test]
    fn weekly_boundary_lands_on_the_configured_day(
        secs in 946_684_800i64..4_102_444_800i64,
        schedule in any_schedule(),
    ) {
        let now = Utc.timestamp_opt(secs, 0).single().unwrap();
        let start = period_start(now, IntervalKind::Weekly, &schedule);
        prop_assert!(now - start < Duration::days(7));
        prop_assert_eq!(
            chrono::Datelike::weekday(&start),
            schedule.weekly_day
        );
    }
}

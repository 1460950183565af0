//! Period boundary calculator for recurring tournaments.
//!
//! [`period_start`] is pure and total: for a fixed
//! `(current_time, interval, schedule)` it always returns the same timestamp,
//! and that timestamp is never after `current_time` (the "most recent period
//! start" contract). Both the delivery scan predicate and period-key
//! construction depend on this stability across restarts.

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, TimeZone, Utc, Weekday};

use crate::model::IntervalKind;

/// Rotation schedule configuration.
///
/// Minutes are offsets from the period's natural start (midnight UTC for
/// daily/weekly, the configured day's midnight for monthly). Offsets past
/// the end of the day clamp to its final minute, like `monthly_day` clamps
/// to short months, so no configuration can push a boundary past the
/// current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSchedule {
    /// Minute of the UTC day a daily tournament rotates.
    pub daily_minute: u16,
    /// Minute offset applied to the weekly rotation day.
    pub weekly_minute: u16,
    /// Weekday a weekly tournament rotates.
    pub weekly_day: Weekday,
    /// Minute offset applied to the monthly rotation day.
    pub monthly_minute: u16,
    /// Day of month a monthly tournament rotates. Clamped to the last valid
    /// day of the month being considered.
    pub monthly_day: u8,
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self {
            daily_minute: 0,
            weekly_minute: 0,
            weekly_day: Weekday::Mon,
            monthly_minute: 0,
            monthly_day: 1,
        }
    }
}

/// Last minute of a UTC day; larger configured offsets clamp here.
const MAX_DAY_MINUTE: u16 = 1439;

fn minute_offset(minute: u16) -> Duration {
    Duration::minutes(i64::from(minute.min(MAX_DAY_MINUTE)))
}

/// Returns the most recent period start at or before `current_time`.
///
/// `Unlimited` tournaments never rotate; their period start is the Unix
/// epoch.
#[must_use]
pub fn period_start(
    current_time: DateTime<Utc>,
    interval: IntervalKind,
    schedule: &RotationSchedule,
) -> DateTime<Utc> {
    let now = current_time.with_timezone(&Utc);
    match interval {
        IntervalKind::Daily => {
            let mut start = midnight(now.date_naive()) + minute_offset(schedule.daily_minute);
            if now < start {
                start -= Duration::hours(24);
            }
            start
        }
        IntervalKind::Weekly => {
            let days_back = i64::from(
                (now.weekday().num_days_from_sunday() + 7
                    - schedule.weekly_day.num_days_from_sunday())
                    % 7,
            );
            let mut start = midnight(now.date_naive()) - Duration::days(days_back)
                + minute_offset(schedule.weekly_minute);
            if now < start {
                start -= Duration::days(7);
            }
            start
        }
        IntervalKind::Monthly => {
            let mut start = month_rotation(now.year(), now.month(), schedule);
            if now < start {
                let previous = first_of_month(now.year(), now.month()) - Months::new(1);
                start = month_rotation(previous.year(), previous.month(), schedule);
            }
            start
        }
        IntervalKind::Unlimited => DateTime::UNIX_EPOCH,
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// Rotation instant within one calendar month, with the configured day
/// clamped into the month's valid range.
fn month_rotation(year: i32, month: u32, schedule: &RotationSchedule) -> DateTime<Utc> {
    let first = first_of_month(year, month);
    let last_day = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.checked_sub_days(Days::new(1)))
        .map_or(28, |d| d.day());
    let day = u32::from(schedule.monthly_day).clamp(1, last_day);
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or(first);
    midnight(date) + minute_offset(schedule.monthly_minute)
}

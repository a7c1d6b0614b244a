//! Pure date predicates used by the tariff rules
//!
//! No state and no I/O: holiday membership takes the configured list as
//! an argument so a new billing year is a config change, not a code
//! change.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// First day of the 2.0TD era (Circular 3/2020 cutover)
const CUTOVER: (i32, u32, u32) = (2021, 6, 1);

/// Saturday or Sunday
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Membership in the configured national-holiday list
pub fn is_holiday(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    holidays.contains(&date)
}

/// Whole days billed entirely off-peak under 2.0TD
pub fn is_off_peak_day(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    is_weekend(date) || is_holiday(date, holidays)
}

/// True from 2021-06-01 onwards
pub fn is_post_cutover(date: NaiveDate) -> bool {
    (date.year(), date.month(), date.day()) >= CUTOVER
}

/// European summer-time membership at date granularity
///
/// Summer time runs from the last Sunday of March (inclusive) to the
/// last Sunday of October (exclusive). Only the legacy two-period night
/// scheme shifts its window on this.
pub fn is_dst(date: NaiveDate) -> bool {
    match (last_sunday(date.year(), 3), last_sunday(date.year(), 10)) {
        (Some(start), Some(end)) => date >= start && date < end,
        _ => false,
    }
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let last_day = NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?;
    let back = last_day.weekday().num_days_from_sunday() as u64;
    last_day.checked_sub_days(Days::new(back))
}

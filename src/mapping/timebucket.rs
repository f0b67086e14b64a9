//! Calendar decomposition of event timestamps
//!
//! Emitted keys bucket time two ways: as full calendar components
//! (year..second, UTC) and as (year, week) pairs. Two week-numbering
//! conventions are in active use and disagree near year boundaries, so
//! each is its own named function:
//!
//! - [`us_week`]: weeks start on Sunday; days before a year's first Sunday
//!   belong to the prior year's last week (52 or 53).
//! - [`iso_week`]: ISO 8601, where weeks start on Monday; the week containing a
//!   year's first Thursday is week 1.
//!
//! 2023-01-01 is the canonical disagreement: US week 1 of 2023, ISO week
//! 52 of 2022.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};

/// UTC calendar components of a timestamp
///
/// Ordered `[year, month(1-12), day, hour, minute, second]`, ready to be
/// appended to a composite key.
pub fn calendar_components(ts: DateTime<Utc>) -> [i64; 6] {
    [
        i64::from(ts.year()),
        i64::from(ts.month()),
        i64::from(ts.day()),
        i64::from(ts.hour()),
        i64::from(ts.minute()),
        i64::from(ts.second()),
    ]
}

/// Weekday of January 1st, Sunday-based (0 = Sunday)
fn jan1_weekday(year: i32) -> u32 {
    NaiveDate::from_yo_opt(year, 1)
        .map(|d| d.weekday().num_days_from_sunday())
        .unwrap_or(0)
}

/// US/calendar week number: Sunday-start weeks
///
/// The offset of the year's first Sunday is derived from January 1st's
/// weekday; a raw offset of 8 (January 1st itself a Sunday) normalizes to
/// 1. Dates before the first Sunday roll back to the prior year's last
/// week: 53 when the prior year's raw offset is 2 or 8, else 52. Returns
/// the week-owning (year, week) pair.
pub fn us_week(date: NaiveDate) -> (i32, u32) {
    let year = date.year();
    let mut offset = 8 - i64::from(jan1_weekday(year));
    if offset == 8 {
        offset = 1;
    }
    let daynum = i64::from(date.ordinal());
    let week = (daynum - offset + 7).div_euclid(7);
    if week == 0 {
        let prior = year - 1;
        let prior_offset = 8 - i64::from(jan1_weekday(prior));
        let last = if prior_offset == 2 || prior_offset == 8 {
            53
        } else {
            52
        };
        (prior, last)
    } else {
        (year, week as u32)
    }
}

/// ISO 8601 week number: Monday-start weeks, first-Thursday rule
///
/// Returns the week-owning (iso_year, week) pair, which differs from the
/// calendar year for dates falling in the last week of the prior ISO year
/// or the first week of the next.
pub fn iso_week(date: NaiveDate) -> (i32, u32) {
    let iso = date.iso_week();
    (iso.year(), iso.week())
}

/// True when the date's US-convention week starts a new Sunday-based week
///
/// Convenience used by tests and callers aligning range scans to week
/// boundaries.
pub fn is_us_week_start(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Sun
}

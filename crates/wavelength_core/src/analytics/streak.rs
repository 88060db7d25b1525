//! Calendar-day streak helpers.

use chrono::{Days, NaiveDate};
use std::collections::BTreeSet;

/// Number of calendar days in `[start, end]`; zero when `end < start`.
pub fn inclusive_day_count(start: NaiveDate, end: NaiveDate) -> u64 {
    let span = end.signed_duration_since(start).num_days();
    u64::try_from(span + 1).unwrap_or(0)
}

/// Length of the consecutive-day run ending at the newest day on or before
/// `end`, provided that day is `end` or the day before it.
pub fn current_streak(days: &BTreeSet<NaiveDate>, end: NaiveDate) -> u32 {
    let mut newest_first = days.range(..=end).rev();
    let Some(&newest) = newest_first.next() else {
        return 0;
    };
    if newest != end && Some(newest) != end.checked_sub_days(Days::new(1)) {
        return 0;
    }

    let mut streak = 1;
    let mut expected = newest.checked_sub_days(Days::new(1));
    for &day in newest_first {
        if Some(day) != expected {
            break;
        }
        streak += 1;
        expected = day.checked_sub_days(Days::new(1));
    }
    streak
}

/// Longest run of consecutive days anywhere in `days`.
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;
    for &day in days {
        current = match previous {
            Some(prev) if prev.succ_opt() == Some(day) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(day);
    }
    longest
}

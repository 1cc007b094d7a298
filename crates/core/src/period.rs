//! Period bucketing: the single source of truth for time-bucket keys.
//!
//! Both the selectable period-option lists and the per-record grouping
//! keys come from the same formatting rules, so option keys and record
//! keys are always comparable by plain string equality:
//!
//! - `Day` → `YYYY-MM-DD`
//! - `Month` → `YYYY-MM`
//! - `Year` → `YYYY`

use chrono::{Datelike, NaiveDate};

use crate::Granularity;

/// The ordered list of selectable period options for a date range.
///
/// - `Day`: empty — day-level charts bucket every record by its own
///   calendar date, so no finite option list exists.
/// - `Month`: every calendar month from `min`'s month through `max`'s
///   month, inclusive on both ends. Equal months produce one option.
/// - `Year`: every calendar year from `min.year()` through `max.year()`,
///   inclusive.
///
/// `min > max` (malformed descriptor bounds) produces an empty list so the
/// UI simply shows no period choices; it is never an error here.
pub fn derive_periods(min: NaiveDate, max: NaiveDate, granularity: Granularity) -> Vec<String> {
    if min > max {
        return Vec::new();
    }
    match granularity {
        Granularity::Day => Vec::new(),
        Granularity::Month => {
            let mut out = Vec::new();
            let (mut year, mut month) = (min.year(), min.month());
            while (year, month) <= (max.year(), max.month()) {
                out.push(format!("{year:04}-{month:02}"));
                if month == 12 {
                    year += 1;
                    month = 1;
                } else {
                    month += 1;
                }
            }
            out
        }
        Granularity::Year => (min.year()..=max.year())
            .map(|year| format!("{year:04}"))
            .collect(),
    }
}

/// The bucket key a record date falls into under a granularity.
///
/// Must stay format-compatible with [`derive_periods`]: grouping keys and
/// option keys are compared with plain string equality.
pub fn bucket_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()),
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Year => format!("{:04}", date.year()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

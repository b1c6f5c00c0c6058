// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Date/time helpers shared by the session, planner, and transcoder.

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The current calendar day in the local timezone. Garmin buckets daily
/// data by the wearer's local day.
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// UTC calendar day of a Garmin epoch-milliseconds timestamp.
pub fn day_from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

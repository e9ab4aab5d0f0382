//! Calendar arithmetic in the configured reporting timezone
//!
//! Month boundaries are computed on local calendar dates and converted back
//! to epoch seconds, so "advance N months" respects month lengths and
//! daylight-saving transitions instead of approximating with a fixed number
//! of seconds.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Seconds in a Julian year, used for tenure measurement
pub const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

const SECONDS_PER_DAY: i64 = 86_400;

/// Timezone used for month boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportingZone {
    /// IANA zone, daylight-saving aware (e.g. "America/New_York")
    Named(Tz),

    /// Constant offset from UTC
    Fixed(FixedOffset),
}

impl ReportingZone {
    /// A named zone wins over the fixed offset when both are configured
    pub fn from_settings(name: Option<&str>, utc_offset_seconds: i32) -> AnalyticsResult<Self> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => named_zone(name),
            None => fixed_offset(utc_offset_seconds),
        }
    }
}

impl fmt::Display for ReportingZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportingZone::Named(tz) => write!(f, "{}", tz.name()),
            ReportingZone::Fixed(offset) => write!(f, "UTC{}", offset),
        }
    }
}

/// Build a fixed-offset reporting zone from seconds east of UTC
pub fn fixed_offset(utc_offset_seconds: i32) -> AnalyticsResult<ReportingZone> {
    FixedOffset::east_opt(utc_offset_seconds)
        .map(ReportingZone::Fixed)
        .ok_or(AnalyticsError::InvalidTimezone {
            seconds: utc_offset_seconds,
        })
}

/// Look up an IANA zone by name
pub fn named_zone(name: &str) -> AnalyticsResult<ReportingZone> {
    name.parse::<Tz>()
        .map(ReportingZone::Named)
        .map_err(|_| AnalyticsError::UnknownTimezone(name.to_string()))
}

/// Whether an instant (with a day of slack for any local offset) is inside chrono's calendar
pub fn is_representable(timestamp: i64) -> bool {
    [timestamp.checked_sub(SECONDS_PER_DAY), timestamp.checked_add(SECONDS_PER_DAY)]
        .into_iter()
        .all(|bound| bound.and_then(|t| DateTime::from_timestamp(t, 0)).is_some())
}

/// Reject reference instants the calendar cannot represent
pub fn checked_instant(timestamp: i64) -> AnalyticsResult<i64> {
    if is_representable(timestamp) {
        Ok(timestamp)
    } else {
        Err(AnalyticsError::InvalidInstant(timestamp))
    }
}

/// Local date-time for an epoch timestamp, `None` if out of chrono's range
pub fn local_datetime(timestamp: i64, tz: &ReportingZone) -> Option<DateTime<FixedOffset>> {
    if !is_representable(timestamp) {
        return None;
    }
    let utc = DateTime::from_timestamp(timestamp, 0)?;
    Some(match tz {
        ReportingZone::Named(zone) => utc.with_timezone(zone).fixed_offset(),
        ReportingZone::Fixed(offset) => utc.with_timezone(offset),
    })
}

/// Local calendar date for an epoch timestamp
pub fn local_date(timestamp: i64, tz: &ReportingZone) -> Option<NaiveDate> {
    local_datetime(timestamp, tz).map(|dt| dt.date_naive())
}

/// First day of the month containing `timestamp`
pub fn month_start_date(timestamp: i64, tz: &ReportingZone) -> Option<NaiveDate> {
    let date = local_date(timestamp, tz)?;
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

/// Epoch seconds for a local wall-clock time
///
/// Ambiguous times (clocks falling back) resolve to the earlier instant;
/// times skipped by a spring-forward gap resolve to one hour later.
pub fn local_to_timestamp(naive: NaiveDateTime, tz: &ReportingZone) -> Option<i64> {
    match tz {
        ReportingZone::Named(zone) => resolve_local(zone, naive),
        ReportingZone::Fixed(offset) => resolve_local(offset, naive),
    }
}

fn resolve_local<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> Option<i64> {
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
            zone.from_local_datetime(&shifted).earliest()
        })
        .map(|dt| dt.timestamp())
}

/// Epoch seconds of local midnight on `date`
pub fn local_midnight(date: NaiveDate, tz: &ReportingZone) -> Option<i64> {
    local_to_timestamp(date.and_hms_opt(0, 0, 0)?, tz)
}

/// Calendar-aware month addition (Jan 31 + 1 month = Feb 28/29)
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// Calendar-aware month subtraction
pub fn sub_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(months))
}

/// Elapsed years between two timestamps; negative spans clamp to zero
pub fn years_between(start: i64, end: i64) -> f64 {
    (end.saturating_sub(start) as f64 / SECONDS_PER_YEAR).max(0.0)
}

//! Load membership records from a CSV export
//!
//! Expected columns: member_id, join_date, end_date, active, membership_type,
//! monthly_payment. Dates may be epoch seconds, `YYYY-MM-DD` (local midnight),
//! `YYYY-MM-DDTHH:MM:SS` (local) or RFC 3339.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::Reader;

use super::{MemberPayment, MembershipRecord, MembershipSnapshot};
use crate::calendar::{is_representable, local_midnight, local_to_timestamp, ReportingZone};
use crate::error::{AnalyticsError, AnalyticsResult};

/// Raw CSV row
#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    member_id: u64,
    #[serde(default)]
    join_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    active: Option<String>,
    #[serde(default)]
    membership_type: Option<String>,
    #[serde(default)]
    monthly_payment: Option<f64>,
}

/// Reason a row could not be turned into a record
#[derive(Debug, Clone, PartialEq)]
enum RowProblem {
    MissingJoinDate,
    BadJoinDate(String),
    BadEndDate(String),
}

impl CsvRow {
    fn to_member_row(self, tz: &ReportingZone) -> Result<MemberRow, RowProblem> {
        let join_raw = self
            .join_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RowProblem::MissingJoinDate)?;
        let join_timestamp =
            parse_timestamp(join_raw, tz).ok_or_else(|| RowProblem::BadJoinDate(join_raw.to_string()))?;

        let end_timestamp = match self.end_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_timestamp(raw, tz).ok_or_else(|| RowProblem::BadEndDate(raw.to_string()))?),
            None => None,
        };

        let has_active_role = self.active.as_deref().map_or(false, parse_flag);

        let record = MembershipRecord {
            member_id: self.member_id,
            join_timestamp,
            end_timestamp,
            has_active_role,
            membership_type: self.membership_type.filter(|t| !t.trim().is_empty()),
        };

        Ok(MemberRow {
            record,
            monthly_payment: self.monthly_payment,
        })
    }
}

/// A loaded record with its recurring payment, if any
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub record: MembershipRecord,
    pub monthly_payment: Option<f64>,
}

/// Result of loading a membership export
#[derive(Debug, Clone, Default)]
pub struct LoadedMembers {
    pub rows: Vec<MemberRow>,

    /// Rows dropped because their dates could not be parsed
    pub skipped: usize,
}

impl LoadedMembers {
    /// Build the engine snapshot as of `now`
    ///
    /// Every record is passed through; payment rows are produced only for
    /// members who are current at `now`, with tenure measured to `now`.
    pub fn into_snapshot(self, now: i64) -> MembershipSnapshot {
        let payments = self
            .rows
            .iter()
            .filter(|row| row.record.is_current(now))
            .map(|row| MemberPayment::from_record(&row.record, row.monthly_payment, now))
            .collect();
        let records = self.rows.into_iter().map(|row| row.record).collect();

        MembershipSnapshot::new(now, records, payments)
    }
}

/// Load members from a CSV file
pub fn load_members<P: AsRef<Path>>(path: P, tz: &ReportingZone) -> AnalyticsResult<LoadedMembers> {
    let reader = Reader::from_path(path)?;
    read_rows(reader, tz)
}

/// Load members from any reader (e.g., string buffer, request body)
pub fn load_members_from_reader<R: std::io::Read>(reader: R, tz: &ReportingZone) -> AnalyticsResult<LoadedMembers> {
    read_rows(Reader::from_reader(reader), tz)
}

fn read_rows<R: std::io::Read>(mut reader: Reader<R>, tz: &ReportingZone) -> AnalyticsResult<LoadedMembers> {
    let mut loaded = LoadedMembers::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) if matches!(err.kind(), csv::ErrorKind::Deserialize { .. }) => {
                log::warn!("Skipping membership row at line {}: {}", line, err);
                loaded.skipped += 1;
                continue;
            }
            Err(err) => return Err(AnalyticsError::Csv(err)),
        };

        match row.to_member_row(tz) {
            Ok(member) => loaded.rows.push(member),
            Err(problem) => {
                log::warn!("Skipping membership row at line {}: {:?}", line, problem);
                loaded.skipped += 1;
            }
        }
    }

    log::debug!(
        "Loaded {} membership rows ({} skipped)",
        loaded.rows.len(),
        loaded.skipped
    );

    Ok(loaded)
}

/// Parse a timestamp in any of the accepted formats
///
/// Epoch values outside the calendar range are rejected like any other bad date.
pub fn parse_timestamp(raw: &str, tz: &ReportingZone) -> Option<i64> {
    let raw = raw.trim();

    if let Ok(seconds) = raw.parse::<i64>() {
        return is_representable(seconds).then_some(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return local_to_timestamp(naive, tz);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return local_midnight(date, tz);
    }

    None
}

/// Interpret the export's active-role column
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "active"
    )
}

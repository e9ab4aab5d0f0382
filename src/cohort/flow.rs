//! Membership inflow/outflow grouped by period and membership type

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{local_date, ReportingZone};
use crate::membership::MembershipRecord;
use crate::stats::saturating_count;

/// Period size used to bucket join/end events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// Lenient parse: anything unrecognized falls back to monthly periods
    pub fn normalize(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    /// Period key for a local date
    pub fn period_key(&self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Month => date.format("%Y-%m-01").to_string(),
            Granularity::Quarter => format!("{}-Q{}", date.year(), (date.month() - 1) / 3 + 1),
            Granularity::Year => format!("{}-01-01", date.year()),
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "quarter" => Ok(Granularity::Quarter),
            "year" => Ok(Granularity::Year),
            other => Err(format!("Unknown granularity: {}", other)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        };
        f.write_str(name)
    }
}

/// Distinct members for one period and membership type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub period: String,
    pub membership_type: String,
    pub count: u32,
}

/// Joins and terminations over a date range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipFlow {
    pub incoming: Vec<FlowEntry>,
    pub ending: Vec<FlowEntry>,
}

impl MembershipFlow {
    pub fn total_incoming(&self) -> u32 {
        self.incoming.iter().map(|e| e.count).sum()
    }

    pub fn total_ending(&self) -> u32 {
        self.ending.iter().map(|e| e.count).sum()
    }
}

/// Count joins and ends whose local date lies in `[start, end]`
///
/// All records are counted; the ambiguous-status exclusion applies to cohort
/// statistics, not to event tallies.
pub fn membership_flow(
    records: &[MembershipRecord],
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
    tz: &ReportingZone,
) -> MembershipFlow {
    let (start, end) = if start > end { (end, start) } else { (start, end) };

    let incoming = aggregate(
        records.iter().map(|r| (r, Some(r.join_timestamp))),
        start,
        end,
        granularity,
        tz,
    );
    let ending = aggregate(
        records.iter().map(|r| (r, r.end_timestamp)),
        start,
        end,
        granularity,
        tz,
    );

    MembershipFlow { incoming, ending }
}

fn aggregate<'a>(
    events: impl Iterator<Item = (&'a MembershipRecord, Option<i64>)>,
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
    tz: &ReportingZone,
) -> Vec<FlowEntry> {
    let mut groups: BTreeMap<(String, String), BTreeSet<u64>> = BTreeMap::new();

    for (record, timestamp) in events {
        let date = match timestamp.and_then(|ts| local_date(ts, tz)) {
            Some(date) => date,
            None => continue,
        };
        if date < start || date > end {
            continue;
        }
        groups
            .entry((granularity.period_key(date), record.type_label().to_string()))
            .or_default()
            .insert(record.member_id);
    }

    groups
        .into_iter()
        .map(|((period, membership_type), members)| FlowEntry {
            period,
            membership_type,
            count: saturating_count(members.len()),
        })
        .collect()
}

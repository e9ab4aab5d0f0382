//! Annual join cohorts with an annualized retention rate
//!
//! The share of a cohort still holding an active role is converted into a
//! per-year rate with a geometric mean over the years the cohort has existed,
//! which normalizes for cohort age:
//!
//!   annualized = max(0.0001, active / joined) ^ (1 / years_elapsed)

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::calendar::{local_date, ReportingZone};
use crate::membership::MembershipRecord;
use crate::stats::round_to;

/// Lower bound on the retained share before taking the root
const MIN_RETAINED_SHARE: f64 = 0.0001;

/// Retention summary for one join year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualCohortRow {
    pub year: i32,
    pub joined: u32,
    pub active: u32,
    pub inactive: u32,
    pub retention_percent: f64,
    pub annualized_retention_percent: f64,
}

/// Summarize eligible records by local join year within `[start_year, end_year]`
///
/// Reversed bounds are swapped. Rows are ordered by year.
pub fn annual_cohorts(
    records: &[MembershipRecord],
    start_year: i32,
    end_year: i32,
    now: i64,
    tz: &ReportingZone,
) -> Vec<AnnualCohortRow> {
    let (start_year, end_year) = if start_year > end_year {
        (end_year, start_year)
    } else {
        (start_year, end_year)
    };
    let current_year = match local_date(now, tz) {
        Some(date) => date.year(),
        None => {
            log::warn!("Reference instant {} is outside the calendar range; no annual cohorts", now);
            return Vec::new();
        }
    };

    // year -> (joined, active)
    let mut cohorts: BTreeMap<i32, (u32, u32)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_eligible()) {
        let year = match local_date(record.join_timestamp, tz) {
            Some(date) => date.year(),
            None => continue,
        };
        if year < start_year || year > end_year {
            continue;
        }
        let entry = cohorts.entry(year).or_insert((0, 0));
        entry.0 += 1;
        if record.has_active_role {
            entry.1 += 1;
        }
    }

    cohorts
        .into_iter()
        .map(|(year, (joined, active))| {
            let share = active as f64 / joined as f64;
            let years_elapsed = (current_year - year + 1).max(1) as f64;
            let annualized = share.max(MIN_RETAINED_SHARE).powf(1.0 / years_elapsed) * 100.0;

            AnnualCohortRow {
                year,
                joined,
                active,
                inactive: joined.saturating_sub(active),
                retention_percent: round_to(share * 100.0, 2),
                annualized_retention_percent: round_to(annualized, 2),
            }
        })
        .collect()
}

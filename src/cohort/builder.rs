//! Monthly join-cohort construction
//!
//! Each eligible member is assigned to the calendar month (in the reporting
//! timezone) containing their join instant. For every cohort the builder
//! walks month offsets 0..=months_back, where the milestone for offset `m` is
//! the cohort's first instant advanced by exactly `m` calendar months:
//!
//! - milestone > now: the offset is not yet observable and is never counted
//! - otherwise a member survives offset `m` iff they have no end date or
//!   ended at or after the milestone
//!
//! Milestones only increase with `m`, so the observable offsets always form a
//! prefix and a member who fails one milestone fails every later one.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calendar::{add_months, local_midnight, month_start_date, sub_months, ReportingZone};
use crate::config::CohortSettings;
use crate::error::AnalyticsResult;
use crate::membership::MembershipRecord;
use crate::stats::saturating_count;

/// Members who joined in the same calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    /// Join month as `YYYY-MM`
    pub cohort_key: String,

    /// First day of the join month (local calendar)
    pub cohort_start: NaiveDate,

    /// Local midnight of `cohort_start`, seconds since epoch
    pub cohort_start_timestamp: i64,

    /// Number of members in the cohort
    pub joined_count: u32,

    /// Members still retained at each month offset (index = offset)
    /// Entries at or past `observable_offsets` are always zero and carry no information
    pub survival_counts: Vec<u32>,

    /// Number of leading offsets whose milestone has already passed
    pub observable_offsets: usize,
}

impl Cohort {
    /// Whether the milestone for `offset` lies at or before the reference instant
    pub fn is_observable(&self, offset: usize) -> bool {
        offset < self.observable_offsets
    }

    /// Survivors at `offset`, or `None` if the offset is not yet observable
    pub fn survivors(&self, offset: usize) -> Option<u32> {
        if self.is_observable(offset) {
            self.survival_counts.get(offset).copied()
        } else {
            None
        }
    }

    /// Display label such as "Jan 2023"
    pub fn label(&self) -> String {
        self.cohort_start.format("%b %Y").to_string()
    }
}

/// Groups records into monthly join cohorts and counts survivors per offset
#[derive(Debug, Clone)]
pub struct CohortBuilder {
    months_back: u32,
    tz: ReportingZone,
}

impl CohortBuilder {
    pub fn new(months_back: u32, tz: ReportingZone) -> Self {
        Self { months_back, tz }
    }

    /// Create from cohort settings, validating the timezone
    pub fn from_settings(settings: &CohortSettings) -> AnalyticsResult<Self> {
        let tz = ReportingZone::from_settings(settings.timezone.as_deref(), settings.utc_offset_seconds)?;
        Ok(Self::new(settings.months_back, tz))
    }

    pub fn months_back(&self) -> u32 {
        self.months_back
    }

    /// Reporting timezone used for month boundaries
    pub fn timezone(&self) -> &ReportingZone {
        &self.tz
    }

    /// Oldest cohort month kept for a run as of `now`
    pub fn window_start(&self, now: i64) -> Option<NaiveDate> {
        sub_months(month_start_date(now, &self.tz)?, self.months_back)
    }

    /// Build cohorts keyed by `YYYY-MM`, ascending
    pub fn build(&self, records: &[MembershipRecord], now: i64) -> BTreeMap<String, Cohort> {
        let window_start = match self.window_start(now) {
            Some(date) => date,
            None => {
                log::warn!("Reference instant {} is outside the calendar range; no cohorts built", now);
                return BTreeMap::new();
            }
        };

        let mut groups: BTreeMap<NaiveDate, Vec<&MembershipRecord>> = BTreeMap::new();
        let mut excluded = 0usize;
        let mut outside_window = 0usize;
        let mut malformed = 0usize;

        for record in records {
            if !record.is_eligible() {
                excluded += 1;
                continue;
            }
            if record.join_timestamp > now {
                outside_window += 1;
                continue;
            }
            if record.end_timestamp.map_or(false, |end| end < record.join_timestamp) {
                malformed += 1;
                continue;
            }
            let start = match month_start_date(record.join_timestamp, &self.tz) {
                Some(start) => start,
                None => {
                    malformed += 1;
                    continue;
                }
            };
            if start < window_start {
                outside_window += 1;
                continue;
            }
            groups.entry(start).or_default().push(record);
        }

        if malformed > 0 {
            log::warn!("Skipped {} membership records with unusable dates", malformed);
        }

        let cohorts: Vec<Cohort> = groups
            .into_par_iter()
            .filter_map(|(start, members)| self.build_cohort(start, &members, now))
            .collect();

        log::debug!(
            "Built {} cohorts since {} ({} ambiguous records excluded, {} outside window)",
            cohorts.len(),
            window_start,
            excluded,
            outside_window
        );

        cohorts
            .into_iter()
            .map(|cohort| (cohort.cohort_key.clone(), cohort))
            .collect()
    }

    /// Milestone instants that have already passed for a cohort starting on `start`
    fn observable_milestones(&self, start: NaiveDate, now: i64) -> Vec<i64> {
        let mut milestones = Vec::with_capacity(self.months_back as usize + 1);
        for offset in 0..=self.months_back {
            let instant = match add_months(start, offset).and_then(|date| local_midnight(date, &self.tz)) {
                Some(instant) => instant,
                None => break,
            };
            if instant > now {
                break;
            }
            milestones.push(instant);
        }
        milestones
    }

    fn build_cohort(&self, start: NaiveDate, members: &[&MembershipRecord], now: i64) -> Option<Cohort> {
        if members.is_empty() {
            return None;
        }
        let cohort_start_timestamp = local_midnight(start, &self.tz)?;
        let milestones = self.observable_milestones(start, now);

        let mut survival_counts = vec![0u32; self.months_back as usize + 1];
        for member in members {
            for (offset, &milestone) in milestones.iter().enumerate() {
                let retained = member.end_timestamp.map_or(true, |end| end >= milestone);
                if !retained {
                    break;
                }
                survival_counts[offset] += 1;
            }
        }

        Some(Cohort {
            cohort_key: start.format("%Y-%m").to_string(),
            cohort_start: start,
            cohort_start_timestamp,
            joined_count: saturating_count(members.len()),
            survival_counts,
            observable_offsets: milestones.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{fixed_offset, named_zone};

    const JAN_1_2023: i64 = 1_672_531_200;
    const JAN_10_2023: i64 = 1_673_308_800;
    const FEB_15_2023: i64 = 1_676_419_200;
    const JUN_15_2023: i64 = 1_686_787_200;
    const JUL_1_2023: i64 = 1_688_169_600;
    const DAY: i64 = 86_400;

    fn builder(months_back: u32) -> CohortBuilder {
        CohortBuilder::new(months_back, fixed_offset(0).unwrap())
    }

    fn january_cohort() -> Vec<MembershipRecord> {
        (1..=10)
            .map(|id| {
                let end = if id <= 2 { Some(FEB_15_2023) } else { None };
                MembershipRecord::new(id, JAN_10_2023, end, end.is_none())
            })
            .collect()
    }

    #[test]
    fn test_single_cohort_survival() {
        let cohorts = builder(12).build(&january_cohort(), JUN_15_2023);
        assert_eq!(cohorts.len(), 1);

        let cohort = &cohorts["2023-01"];
        assert_eq!(cohort.joined_count, 10);
        assert_eq!(cohort.cohort_start_timestamp, JAN_1_2023);
        assert_eq!(cohort.observable_offsets, 6);
        assert_eq!(cohort.survival_counts.len(), 13);
        assert_eq!(&cohort.survival_counts[..6], &[10, 10, 8, 8, 8, 8]);
        assert_eq!(cohort.survivors(6), None);
        assert_eq!(cohort.label(), "Jan 2023");
    }

    #[test]
    fn test_milestone_equal_to_now_is_observable() {
        let cohorts = builder(12).build(&january_cohort(), JUL_1_2023);
        assert_eq!(cohorts["2023-01"].observable_offsets, 7);

        let cohorts = builder(12).build(&january_cohort(), JUL_1_2023 - 1);
        assert_eq!(cohorts["2023-01"].observable_offsets, 6);
    }

    #[test]
    fn test_end_on_milestone_counts_as_retained() {
        // Ends exactly at the month-1 milestone (Feb 1st)
        let feb_1 = JAN_1_2023 + 31 * DAY;
        let records = vec![MembershipRecord::new(1, JAN_10_2023, Some(feb_1), false)];
        let cohort = &builder(3).build(&records, JUN_15_2023)["2023-01"];
        assert_eq!(&cohort.survival_counts, &[1, 1, 0, 0]);
    }

    #[test]
    fn test_month_zero_equals_joined() {
        let mut records = january_cohort();
        // Joins and leaves within the same month
        records.push(MembershipRecord::new(11, JAN_10_2023, Some(JAN_10_2023 + DAY), false));

        let cohorts = builder(6).build(&records, JUN_15_2023);
        for cohort in cohorts.values() {
            assert_eq!(cohort.survival_counts[0], cohort.joined_count);
        }
    }

    #[test]
    fn test_ambiguous_records_excluded() {
        let records = vec![
            MembershipRecord::new(1, JAN_10_2023, None, true),
            MembershipRecord::new(2, JAN_10_2023, None, false),
        ];
        let cohorts = builder(6).build(&records, JUN_15_2023);
        assert_eq!(cohorts["2023-01"].joined_count, 1);
    }

    #[test]
    fn test_window_drops_old_cohorts() {
        let records = vec![
            MembershipRecord::new(1, JAN_10_2023, None, true),
            // 2022-12-15 is older than June minus 5 months
            MembershipRecord::new(2, JAN_1_2023 - 17 * DAY, None, true),
        ];
        let builder = builder(5);
        assert_eq!(builder.window_start(JUN_15_2023), NaiveDate::from_ymd_opt(2023, 1, 1));

        let cohorts = builder.build(&records, JUN_15_2023);
        assert_eq!(cohorts.keys().collect::<Vec<_>>(), vec!["2023-01"]);
    }

    #[test]
    fn test_future_joins_ignored() {
        let records = vec![MembershipRecord::new(1, JUL_1_2023, None, true)];
        assert!(builder(12).build(&records, JUN_15_2023).is_empty());
    }

    #[test]
    fn test_cohorts_ordered_by_key() {
        let records = vec![
            MembershipRecord::new(1, FEB_15_2023, None, true),
            MembershipRecord::new(2, JAN_10_2023, None, true),
            MembershipRecord::new(3, JUN_15_2023, None, true),
        ];
        let cohorts = builder(12).build(&records, JUN_15_2023);
        let keys: Vec<_> = cohorts.keys().cloned().collect();
        assert_eq!(keys, vec!["2023-01", "2023-02", "2023-06"]);

        // The current month's cohort only has offset 0 observable
        assert_eq!(cohorts["2023-06"].observable_offsets, 1);
    }

    #[test]
    fn test_timezone_shifts_cohort_month() {
        // 2023-02-01T03:00Z joins the January cohort in UTC-5
        let records = vec![MembershipRecord::new(1, 1_675_220_400, None, true)];
        let eastern = CohortBuilder::new(6, fixed_offset(-5 * 3600).unwrap());

        let cohorts = eastern.build(&records, JUN_15_2023);
        let cohort = &cohorts["2023-01"];
        assert_eq!(cohort.cohort_start_timestamp, JAN_1_2023 + 5 * 3600);
    }

    #[test]
    fn test_named_zone_cohorts_follow_daylight_saving() {
        // 2023-08-01T00:30 EDT, leaving 2023-11-30T23:30 EST
        let join = 1_690_864_200;
        let end = 1_701_405_000;
        let jan_15_2024 = 1_705_276_800;
        let records = vec![MembershipRecord::new(1, join, Some(end), false)];

        let eastern = CohortBuilder::new(6, named_zone("America/New_York").unwrap());
        let cohorts = eastern.build(&records, jan_15_2024);
        let cohort = &cohorts["2023-08"];
        assert_eq!(cohort.cohort_start_timestamp, 1_690_862_400);
        assert_eq!(cohort.observable_offsets, 6);
        // The December milestone is EST midnight, after the 23:30 exit
        assert_eq!(&cohort.survival_counts, &[1, 1, 1, 1, 0, 0, 0]);

        let fixed = CohortBuilder::new(6, fixed_offset(-5 * 3600).unwrap());
        assert!(fixed.build(&records, jan_15_2024).contains_key("2023-07"));
    }

    #[test]
    fn test_from_settings_prefers_named_zone() {
        let settings = CohortSettings {
            timezone: Some("America/New_York".to_string()),
            ..CohortSettings::default()
        };
        let builder = CohortBuilder::from_settings(&settings).unwrap();
        assert_eq!(builder.timezone(), &named_zone("America/New_York").unwrap());

        let unknown = CohortSettings {
            timezone: Some("Nowhere/Special".to_string()),
            ..CohortSettings::default()
        };
        assert!(CohortBuilder::from_settings(&unknown).is_err());
    }

    #[test]
    fn test_end_before_join_skipped() {
        let records = vec![MembershipRecord::new(1, FEB_15_2023, Some(JAN_10_2023), false)];
        assert!(builder(6).build(&records, JUN_15_2023).is_empty());
    }
}

//! Retention engine: runs every analytics component against one snapshot
//!
//! Settings are validated and the timezone and tenure tables are resolved once
//! at construction, then reused for any number of runs.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::{report_key, MetricCache, MEMBERSHIP_LIST_TAG, RETENTION_REPORT_TAG};
use crate::calendar::ReportingZone;
use crate::churn::{ChurnCurve, ChurnCurveEstimator};
use crate::cohort::{
    annual_cohorts, membership_flow, AnnualCohortRow, CohortBuilder, Granularity, MembershipFlow,
    RetentionMatrixCalculator, RetentionMatrixRow,
};
use crate::config::AnalyticsConfig;
use crate::error::AnalyticsResult;
use crate::lifetime::{LifetimeValueProjector, LifetimeValueTable};
use crate::membership::{MembershipRecord, MembershipSnapshot, TenureSummary};

/// Everything computed for one reference instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub reference_instant: i64,
    pub months_back: u32,
    pub retention_matrix: Vec<RetentionMatrixRow>,
    pub churn_curve: ChurnCurve,
    pub lifetime_values: LifetimeValueTable,
    pub lifetime_value_by_type: BTreeMap<String, f64>,
    pub tenure_summary: TenureSummary,
}

/// Pre-configured analytics engine
#[derive(Debug, Clone)]
pub struct RetentionEngine {
    config: AnalyticsConfig,
    cohorts: CohortBuilder,
    matrix: RetentionMatrixCalculator,
    churn: ChurnCurveEstimator,
    lifetime: LifetimeValueProjector,
}

impl RetentionEngine {
    /// Validate the config and build every component
    pub fn new(config: AnalyticsConfig) -> AnalyticsResult<Self> {
        config.validate()?;
        let terminal_start_year = u8::try_from(config.churn.terminal_start_year).unwrap_or(u8::MAX);

        Ok(Self {
            cohorts: CohortBuilder::from_settings(&config.cohort)?,
            matrix: RetentionMatrixCalculator::new(),
            churn: ChurnCurveEstimator::new(config.churn.clone()),
            lifetime: LifetimeValueProjector::new(
                config.lifetime.clone(),
                terminal_start_year,
            ),
            config,
        })
    }

    /// Engine with the dashboard defaults
    pub fn default_dashboard() -> AnalyticsResult<Self> {
        Self::new(AnalyticsConfig::default_dashboard())
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn timezone(&self) -> &ReportingZone {
        self.cohorts.timezone()
    }

    /// Compute the full report for a snapshot
    pub fn run(&self, snapshot: &MembershipSnapshot) -> RetentionReport {
        let now = snapshot.reference_instant;
        let records = &snapshot.records;

        let cohorts = self.cohorts.build(records, now);
        let retention_matrix = self.matrix.calculate(&cohorts);
        let churn_curve = self.churn.estimate(records, now);
        let lifetime_values = self.lifetime.project(&snapshot.payments, &churn_curve);
        let lifetime_value_by_type = self.lifetime.by_membership_type(&snapshot.payments, &churn_curve);
        let tenure_summary = TenureSummary::from_records(records, now);

        log::info!(
            "Retention report as of {}: {} records, {} cohorts, {} paying members",
            now,
            records.len(),
            retention_matrix.len(),
            snapshot.payments.iter().filter(|p| p.qualifying_payment().is_some()).count()
        );

        RetentionReport {
            reference_instant: now,
            months_back: self.cohorts.months_back(),
            retention_matrix,
            churn_curve,
            lifetime_values,
            lifetime_value_by_type,
            tenure_summary,
        }
    }

    /// Cache key for a snapshot's report
    pub fn cache_key(&self, reference_instant: i64) -> String {
        report_key(
            self.cohorts.months_back(),
            reference_instant,
            self.config.cache.instant_granularity_seconds,
        )
    }

    /// Return a cached report for the snapshot's bucketed instant, computing it on a miss
    ///
    /// A cached payload that no longer decodes is treated as a miss and overwritten.
    pub fn report_cached(
        &self,
        snapshot: &MembershipSnapshot,
        cache: &mut dyn MetricCache,
    ) -> AnalyticsResult<RetentionReport> {
        let key = self.cache_key(snapshot.reference_instant);

        if let Some(cached) = cache.get(&key) {
            match serde_json::from_value::<RetentionReport>(cached) {
                Ok(report) => {
                    log::debug!("Cache hit for {}", key);
                    return Ok(report);
                }
                Err(e) => log::warn!("Discarding undecodable cache entry {}: {}", key, e),
            }
        }

        let report = self.run(snapshot);
        cache.set(
            &key,
            serde_json::to_value(&report)?,
            Duration::from_secs(self.config.cache.ttl_seconds),
            &[MEMBERSHIP_LIST_TAG, RETENTION_REPORT_TAG],
        );
        Ok(report)
    }

    /// Annual join cohorts in the engine's timezone
    pub fn annual_cohorts(
        &self,
        records: &[MembershipRecord],
        start_year: i32,
        end_year: i32,
        now: i64,
    ) -> Vec<AnnualCohortRow> {
        annual_cohorts(records, start_year, end_year, now, self.timezone())
    }

    /// Join/end counts per period in the engine's timezone
    pub fn membership_flow(
        &self,
        records: &[MembershipRecord],
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> MembershipFlow {
        membership_flow(records, start, end, granularity, self.timezone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryMetricCache;
    use crate::calendar::{fixed_offset, local_midnight};
    use crate::churn::TenureBucket;
    use crate::membership::MemberPayment;
    use serde_json::json;

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        let tz = fixed_offset(0).unwrap();
        local_midnight(NaiveDate::from_ymd_opt(y, m, d).unwrap(), &tz).unwrap()
    }

    fn snapshot() -> MembershipSnapshot {
        let now = ts(2023, 6, 15);
        let mut records = Vec::new();
        for i in 0..10u64 {
            let end = if i < 2 { Some(ts(2023, 2, 15)) } else { None };
            records.push(MembershipRecord::new(i, ts(2023, 1, 10), end, end.is_none()).with_type("Individual"));
        }
        records.push(MembershipRecord::new(20, ts(2015, 3, 1), None, true).with_type("Family"));
        records.push(MembershipRecord::new(21, ts(2019, 5, 5), Some(ts(2022, 8, 1)), false));
        records.push(MembershipRecord::new(22, ts(2022, 11, 20), None, true));
        // Ambiguous status
        records.push(MembershipRecord::new(23, ts(2022, 2, 1), None, false));

        let payments = records
            .iter()
            .filter(|r| r.is_current(now))
            .map(|r| MemberPayment::from_record(r, Some(45.0), now))
            .collect();

        MembershipSnapshot::new(now, records, payments)
    }

    fn engine(months_back: u32) -> RetentionEngine {
        let mut config = AnalyticsConfig::default_dashboard();
        config.cohort.months_back = months_back;
        RetentionEngine::new(config).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = AnalyticsConfig::default_dashboard();
        config.churn.churn_floor = 0.0;
        assert!(RetentionEngine::new(config).is_err());
    }

    #[test]
    fn test_january_cohort_matrix() {
        let report = engine(12).run(&snapshot());

        let january = report
            .retention_matrix
            .iter()
            .find(|row| row.cohort_key == "2023-01")
            .expect("January cohort present");
        assert_eq!(january.joined, 10);
        assert_eq!(
            &january.retention[..8],
            &[Some(100.0), Some(100.0), Some(80.0), Some(80.0), Some(80.0), Some(80.0), None, None]
        );
        // The 2015 and 2019 joins fall outside a 12-month window
        assert_eq!(report.retention_matrix.len(), 2);
    }

    #[test]
    fn test_report_properties() {
        let report = engine(24).run(&snapshot());

        for row in &report.retention_matrix {
            assert_eq!(row.retention[0], Some(100.0));
            let observed = row.observed_len();
            assert!(row.retention[observed..].iter().all(Option::is_none));
        }

        for (bucket, point) in report.churn_curve.iter() {
            let cap = if bucket.is_terminal() { 20.0 } else { 15.0 };
            assert!(point.expected_future_years.is_finite());
            assert!(point.expected_future_years > 0.0 && point.expected_future_years <= cap);
        }

        assert!(report.lifetime_values.contains_key(&TenureBucket::Year(0)));
        assert!(report.lifetime_values.contains_key(&TenureBucket::Year(8)));
        assert_eq!(report.tenure_summary.member_count, 13);
        assert_eq!(report.tenure_summary.active_count, 10);
    }

    #[test]
    fn test_run_is_idempotent() {
        let engine = engine(24);
        let snapshot = snapshot();

        let first = serde_json::to_string(&engine.run(&snapshot)).unwrap();
        let second = serde_json::to_string(&engine.run(&snapshot)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_cached() {
        let engine = engine(24);
        let snapshot = snapshot();
        let mut cache = InMemoryMetricCache::new();

        let computed = engine.report_cached(&snapshot, &mut cache).unwrap();
        let cached = engine.report_cached(&snapshot, &mut cache).unwrap();
        assert_eq!(computed, cached);
        assert_eq!(cache.cache_hits, 1);
        assert_eq!(cache.cache_misses, 1);

        assert_eq!(cache.invalidate_tags(&[MEMBERSHIP_LIST_TAG]), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_undecodable_cache_entry_is_recomputed() {
        let engine = engine(24);
        let snapshot = snapshot();
        let mut cache = InMemoryMetricCache::new();
        let key = engine.cache_key(snapshot.reference_instant);
        cache.set(&key, json!({"stale": true}), Duration::from_secs(60), &[]);

        let report = engine.report_cached(&snapshot, &mut cache).unwrap();
        assert_eq!(report, engine.run(&snapshot));
        assert!(serde_json::from_value::<RetentionReport>(cache.get(&key).unwrap()).is_ok());
    }

    #[test]
    fn test_engine_uses_named_timezone() {
        let mut config = AnalyticsConfig::default_dashboard();
        config.cohort.timezone = Some("America/New_York".to_string());
        let engine = RetentionEngine::new(config).unwrap();
        assert_eq!(engine.timezone().to_string(), "America/New_York");

        // 2023-08-01T00:30 EDT belongs to August, not July
        let records = vec![MembershipRecord::new(1, 1_690_864_200, None, true)];
        let snapshot = MembershipSnapshot::new(ts(2023, 9, 15), records, Vec::new());
        let report = engine.run(&snapshot);
        let keys: Vec<_> = report.retention_matrix.iter().map(|r| r.cohort_key.as_str()).collect();
        assert_eq!(keys, vec!["2023-08"]);
    }

    #[test]
    fn test_supplementary_views_use_engine_timezone() {
        let engine = engine(24);
        let snapshot = snapshot();

        let annual = engine.annual_cohorts(&snapshot.records, 2023, 2015, snapshot.reference_instant);
        assert_eq!(annual.first().map(|r| r.year), Some(2015));
        assert_eq!(annual.last().map(|r| (r.year, r.joined, r.active)), Some((2023, 10, 8)));

        let flow = engine.membership_flow(
            &snapshot.records,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
            Granularity::Month,
        );
        assert_eq!(flow.total_incoming(), 10);
        assert_eq!(flow.total_ending(), 2);
    }
}

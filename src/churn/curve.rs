//! Smoothed churn curve by tenure year
//!
//! For each tenure year `y` the estimator counts:
//! - entered[y]: members whose tenure so far (or final tenure) is at least `y` years
//! - churned[y]: ended members whose final tenure falls in `[y, y + 1)`
//!
//! Year 0 uses its own counts only, since first-year churn behaves differently
//! from later years. Years 1 and up pool counts over a sliding window
//! `[y - r, y + r]` (r = smoothing radius) before dividing. The terminal
//! bucket pools every year from its start year to `max_year`.
//!
//! Expected future years is the reciprocal of the churn rate after applying a
//! floor, then capped:
//!
//!   expected = min(1 / max(rate, floor), cap)
//!
//! An empty pool is treated as fully churned (rate 1.0), so every point is
//! finite and positive regardless of input.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::TenureBucket;
use crate::config::ChurnCurveSettings;
use crate::membership::MembershipRecord;

/// Churn statistics for one tenure bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnCurvePoint {
    /// Members entering the pooled window
    pub entered_count: u64,

    /// Members who churned within the pooled window
    pub churned_count: u64,

    /// Pooled churn rate (0..=1), before the floor is applied
    pub churn_rate: f64,

    /// Projected remaining tenure in years, floored and capped
    pub expected_future_years: f64,
}

/// Churn curve keyed by tenure bucket, terminal bucket last
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChurnCurve {
    points: BTreeMap<TenureBucket, ChurnCurvePoint>,
}

impl ChurnCurve {
    pub fn get(&self, bucket: TenureBucket) -> Option<&ChurnCurvePoint> {
        self.points.get(&bucket)
    }

    pub fn expected_future_years(&self, bucket: TenureBucket) -> Option<f64> {
        self.get(bucket).map(|p| p.expected_future_years)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TenureBucket, &ChurnCurvePoint)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<(TenureBucket, ChurnCurvePoint)> for ChurnCurve {
    fn from_iter<I: IntoIterator<Item = (TenureBucket, ChurnCurvePoint)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Raw entered/churned counts by whole tenure year `0..=max_year`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenureCounts {
    pub entered: Vec<u64>,
    pub churned: Vec<u64>,
}

impl TenureCounts {
    pub fn new(max_year: u32) -> Self {
        let len = max_year as usize + 1;
        Self {
            entered: vec![0; len],
            churned: vec![0; len],
        }
    }

    pub fn max_year(&self) -> usize {
        self.entered.len() - 1
    }

    /// Record one member's tenure
    pub fn add(&mut self, tenure_years: f64, ended: bool) {
        if !tenure_years.is_finite() || tenure_years < 0.0 {
            return;
        }
        let whole_years = tenure_years.floor() as usize;
        let reached = whole_years.min(self.max_year());
        for entered in &mut self.entered[..=reached] {
            *entered += 1;
        }
        if ended && whole_years <= self.max_year() {
            self.churned[whole_years] += 1;
        }
    }

    /// Combine partial counts (commutative and associative)
    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.entered.iter_mut().zip(&other.entered) {
            *a += b;
        }
        for (a, b) in self.churned.iter_mut().zip(&other.churned) {
            *a += b;
        }
        self
    }

    /// Sum (entered, churned) over the inclusive year window `[from, to]`
    pub fn pooled(&self, from: usize, to: usize) -> (u64, u64) {
        let to = to.min(self.max_year());
        if from > to {
            return (0, 0);
        }
        (
            self.entered[from..=to].iter().sum(),
            self.churned[from..=to].iter().sum(),
        )
    }
}

/// Derives the churn curve from membership tenure
#[derive(Debug, Clone)]
pub struct ChurnCurveEstimator {
    settings: ChurnCurveSettings,
}

impl ChurnCurveEstimator {
    pub fn new(settings: ChurnCurveSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ChurnCurveSettings {
        &self.settings
    }

    /// Estimate the curve for eligible records as of `now`
    pub fn estimate(&self, records: &[MembershipRecord], now: i64) -> ChurnCurve {
        let counts = self.tenure_counts(records, now);
        self.curve_from_counts(&counts)
    }

    /// Count entered/churned members per tenure year (parallel, order independent)
    pub fn tenure_counts(&self, records: &[MembershipRecord], now: i64) -> TenureCounts {
        let max_year = self.settings.max_year;
        let counts = records
            .par_iter()
            .filter(|r| r.is_observed_at(now))
            .fold(
                || TenureCounts::new(max_year),
                |mut acc, record| {
                    acc.add(record.tenure_years(now), record.has_ended(now));
                    acc
                },
            )
            .reduce(|| TenureCounts::new(max_year), TenureCounts::merge);

        log::debug!(
            "Tenure counts: {} members entered year 0, {} churned in year 0",
            counts.entered[0],
            counts.churned[0]
        );

        counts
    }

    /// Build curve points for years `0..terminal_start_year` plus the terminal bucket
    pub fn curve_from_counts(&self, counts: &TenureCounts) -> ChurnCurve {
        let s = &self.settings;
        let radius = s.smoothing_radius as usize;
        let max_year = counts.max_year();
        // Buckets are keyed by u8 years; larger settings clamp to the last key
        let terminal_start = u8::try_from(s.terminal_start_year).unwrap_or(u8::MAX);

        let mut points: Vec<(TenureBucket, ChurnCurvePoint)> = (0..terminal_start)
            .map(|bucket_year| {
                let year = usize::from(bucket_year);
                let (from, to) = if year == 0 {
                    (0, 0)
                } else {
                    (year.saturating_sub(radius), (year + radius).min(max_year))
                };
                let (entered, churned) = counts.pooled(from, to);
                let point = Self::point(entered, churned, s.churn_floor, s.max_expected_years);
                (TenureBucket::Year(bucket_year), point)
            })
            .collect();

        let (entered, churned) = counts.pooled(usize::from(terminal_start), max_year);
        points.push((
            TenureBucket::Terminal(terminal_start),
            Self::point(entered, churned, s.terminal_churn_floor, s.terminal_max_expected_years),
        ));

        points.into_iter().collect()
    }

    fn point(entered: u64, churned: u64, floor: f64, cap: f64) -> ChurnCurvePoint {
        let churn_rate = if entered > 0 {
            churned as f64 / entered as f64
        } else {
            1.0
        };
        let safe_churn = churn_rate.max(floor);

        ChurnCurvePoint {
            entered_count: entered,
            churned_count: churned,
            churn_rate,
            expected_future_years: (1.0 / safe_churn).min(cap),
        }
    }
}

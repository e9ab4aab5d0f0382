//! Lifetime value by tenure bucket
//!
//! Each paying member contributes:
//! - realized value: whole months of tenure so far x monthly payment
//! - projected value: monthly payment x expected future years (from the churn curve) x 12
//!
//! Buckets report simple means of both, plus their sum. The "0 Years" bucket is
//! always present so dashboards have a new-member baseline: when nobody currently
//! sits in their first year, it is filled in from the average monthly payment of
//! all paying members and the year-0 churn point.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::churn::{tenure_table, ChurnCurve, TenureBucket};
use crate::config::LifetimeValueSettings;
use crate::membership::MemberPayment;
use crate::stats::{average, round_to, saturating_count, RangeTable};

/// Aggregated value for one tenure bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifetimeValueBucket {
    /// Axis label, e.g. "3 Years" or "10+ Years"
    pub label: String,

    /// Paying members in the bucket (0 for the synthetic new-member baseline)
    pub member_count: u32,

    /// Mean revenue already collected
    pub average_realized_value: f64,

    /// Mean revenue expected over the remaining tenure
    pub average_projected_value: f64,

    /// Expected remaining tenure in months for this bucket
    pub projected_months: f64,

    /// average_realized_value + average_projected_value
    pub total_value: f64,
}

/// LTV buckets ordered by ascending tenure, terminal bucket last
pub type LifetimeValueTable = BTreeMap<TenureBucket, LifetimeValueBucket>;

/// Realized and projected value for one paying member
#[derive(Debug, Clone, PartialEq)]
pub struct MemberValue<'a> {
    pub bucket: TenureBucket,
    pub monthly_payment: f64,
    pub realized: f64,
    pub projected: f64,
    pub membership_type: Option<&'a str>,
}

/// Projects remaining revenue per tenure bucket from a churn curve
#[derive(Debug, Clone)]
pub struct LifetimeValueProjector {
    settings: LifetimeValueSettings,
    tenure_table: RangeTable<TenureBucket>,
}

impl LifetimeValueProjector {
    pub fn new(settings: LifetimeValueSettings, terminal_start_year: u8) -> Self {
        Self {
            settings,
            tenure_table: tenure_table(terminal_start_year),
        }
    }

    /// Expected future years for a bucket, with the configured fallback
    pub fn expected_future_years(&self, curve: &ChurnCurve, bucket: TenureBucket) -> f64 {
        curve.expected_future_years(bucket).unwrap_or_else(|| {
            log::debug!("No churn point for bucket {}, using fallback", bucket);
            self.settings.fallback_expected_years
        })
    }

    /// Per-member values for qualifying payments, in input order
    pub fn member_values<'a>(&self, payments: &'a [MemberPayment], curve: &ChurnCurve) -> Vec<MemberValue<'a>> {
        payments
            .par_iter()
            .filter_map(|payment| {
                let monthly = payment.qualifying_payment()?;
                let bucket = *self.tenure_table.resolve(payment.tenure_years)?;
                let tenure_months = (payment.tenure_years * 12.0).floor();
                let expected_years = self.expected_future_years(curve, bucket);

                Some(MemberValue {
                    bucket,
                    monthly_payment: monthly,
                    realized: tenure_months * monthly,
                    projected: monthly * expected_years * 12.0,
                    membership_type: payment.membership_type.as_deref(),
                })
            })
            .collect()
    }

    /// Aggregate member values into tenure buckets
    pub fn project(&self, payments: &[MemberPayment], curve: &ChurnCurve) -> LifetimeValueTable {
        let values = self.member_values(payments, curve);

        let mut grouped: BTreeMap<TenureBucket, Vec<&MemberValue>> = BTreeMap::new();
        for value in &values {
            grouped.entry(value.bucket).or_default().push(value);
        }

        let mut table: LifetimeValueTable = grouped
            .into_iter()
            .map(|(bucket, members)| {
                let realized: Vec<f64> = members.iter().map(|m| m.realized).collect();
                let projected: Vec<f64> = members.iter().map(|m| m.projected).collect();
                let entry = self.bucket_entry(
                    curve,
                    bucket,
                    saturating_count(members.len()),
                    average(&realized).unwrap_or(0.0),
                    average(&projected).unwrap_or(0.0),
                );
                (bucket, entry)
            })
            .collect();

        let new_member = TenureBucket::Year(0);
        if !table.contains_key(&new_member) {
            let payments: Vec<f64> = values.iter().map(|v| v.monthly_payment).collect();
            let average_payment = average(&payments).unwrap_or(0.0);
            let projected = average_payment * self.expected_future_years(curve, new_member) * 12.0;
            table.insert(new_member, self.bucket_entry(curve, new_member, 0, 0.0, projected));
        }

        log::debug!(
            "Projected lifetime value for {} paying members across {} buckets",
            values.len(),
            table.len()
        );

        table
    }

    fn bucket_entry(
        &self,
        curve: &ChurnCurve,
        bucket: TenureBucket,
        member_count: u32,
        realized: f64,
        projected: f64,
    ) -> LifetimeValueBucket {
        LifetimeValueBucket {
            label: bucket.label(),
            member_count,
            average_realized_value: round_to(realized, 2),
            average_projected_value: round_to(projected, 2),
            projected_months: round_to(self.expected_future_years(curve, bucket) * 12.0, 2),
            total_value: round_to(realized + projected, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::churn::ChurnCurveEstimator;
    use crate::churn::TenureCounts;
    use crate::config::ChurnCurveSettings;
    use approx::assert_relative_eq;

    /// Curve where year 0 expects 2.5 years and every other bucket the floor cap
    fn curve() -> ChurnCurve {
        let mut counts = TenureCounts::new(15);
        counts.entered[0] = 100;
        counts.churned[0] = 40;
        for y in 1..=15 {
            counts.entered[y] = 100;
        }
        ChurnCurveEstimator::new(ChurnCurveSettings::default()).curve_from_counts(&counts)
    }

    fn projector() -> LifetimeValueProjector {
        LifetimeValueProjector::new(LifetimeValueSettings::default(), 10)
    }

    #[test]
    fn test_bucket_means() {
        let payments = vec![
            MemberPayment::new(1, 3.5, Some(50.0)),
            MemberPayment::new(2, 3.1, Some(30.0)),
            MemberPayment::new(3, 0.5, Some(40.0)),
        ];
        let table = projector().project(&payments, &curve());

        let year3 = &table[&TenureBucket::Year(3)];
        assert_eq!(year3.member_count, 2);
        assert_eq!(year3.label, "3 Years");
        // 42 months x 50 and 37 months x 30
        assert_relative_eq!(year3.average_realized_value, (2100.0 + 1110.0) / 2.0);

        let expected_years = curve().expected_future_years(TenureBucket::Year(3)).unwrap();
        assert_relative_eq!(
            year3.average_projected_value,
            round_to(40.0 * expected_years * 12.0, 2),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            year3.total_value,
            round_to(1605.0 + 40.0 * expected_years * 12.0, 2),
            epsilon = 1e-9
        );

        let year0 = &table[&TenureBucket::Year(0)];
        assert_eq!(year0.member_count, 1);
        // 6 months x 40, then 40 x 2.5 years x 12
        assert_relative_eq!(year0.average_realized_value, 240.0);
        assert_relative_eq!(year0.average_projected_value, 1200.0);
        assert_relative_eq!(year0.projected_months, 30.0);
    }

    #[test]
    fn test_synthetic_new_member_bucket() {
        let payments = vec![
            MemberPayment::new(1, 4.2, Some(60.0)),
            MemberPayment::new(2, 6.0, Some(20.0)),
        ];
        let table = projector().project(&payments, &curve());

        let year0 = &table[&TenureBucket::Year(0)];
        assert_eq!(year0.member_count, 0);
        assert_eq!(year0.label, "0 Years");
        assert_eq!(year0.average_realized_value, 0.0);
        // Average payment 40 x 2.5 years x 12
        assert_relative_eq!(year0.average_projected_value, 1200.0);
        assert_relative_eq!(year0.total_value, 1200.0);
    }

    #[test]
    fn test_new_member_bucket_without_payments() {
        let table = projector().project(&[], &curve());
        assert_eq!(table.len(), 1);
        assert_eq!(table[&TenureBucket::Year(0)].total_value, 0.0);
    }

    #[test]
    fn test_non_positive_payments_excluded() {
        let payments = vec![
            MemberPayment::new(1, 2.0, Some(0.0)),
            MemberPayment::new(2, 2.0, Some(-10.0)),
            MemberPayment::new(3, 2.0, None),
        ];
        let table = projector().project(&payments, &curve());
        assert!(!table.contains_key(&TenureBucket::Year(2)));
    }

    #[test]
    fn test_long_tenure_in_terminal_bucket() {
        let payments = vec![MemberPayment::new(1, 11.4, Some(25.0))];
        let table = projector().project(&payments, &curve());

        assert!(!table.contains_key(&TenureBucket::Year(9)));
        let terminal = &table[&TenureBucket::Terminal(10)];
        assert_eq!(terminal.label, "10+ Years");
        assert_eq!(terminal.member_count, 1);
        // floor(11.4 x 12) = 136 months
        assert_relative_eq!(terminal.average_realized_value, 136.0 * 25.0);
        // Terminal bucket is last in iteration order
        assert_eq!(table.keys().last(), Some(&TenureBucket::Terminal(10)));
    }

    #[test]
    fn test_missing_curve_point_uses_fallback() {
        let payments = vec![MemberPayment::new(1, 1.5, Some(100.0))];
        let table = projector().project(&payments, &ChurnCurve::default());

        let year1 = &table[&TenureBucket::Year(1)];
        // 100 x 0.5 years x 12
        assert_relative_eq!(year1.average_projected_value, 600.0);
        assert_relative_eq!(year1.projected_months, 6.0);
    }
}

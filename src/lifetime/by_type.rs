//! Average lifetime value per membership type

use std::collections::BTreeMap;

use crate::churn::ChurnCurve;
use crate::membership::{type_label, MemberPayment};
use crate::stats::{average, round_to};

use super::LifetimeValueProjector;

impl LifetimeValueProjector {
    /// Mean realized + projected value per membership type, rounded to cents
    ///
    /// Members without a type are reported under "Unknown".
    pub fn by_membership_type(&self, payments: &[MemberPayment], curve: &ChurnCurve) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for value in self.member_values(payments, curve) {
            totals
                .entry(type_label(value.membership_type))
                .or_default()
                .push(value.realized + value.projected);
        }

        totals
            .into_iter()
            .filter_map(|(membership_type, values)| {
                average(&values).map(|mean| (membership_type.to_string(), round_to(mean, 2)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::churn::{ChurnCurveEstimator, TenureBucket};
    use crate::config::{ChurnCurveSettings, LifetimeValueSettings};
    use approx::assert_relative_eq;

    fn payment(id: u64, tenure: f64, amount: f64, membership_type: Option<&str>) -> MemberPayment {
        MemberPayment {
            membership_type: membership_type.map(str::to_string),
            ..MemberPayment::new(id, tenure, Some(amount))
        }
    }

    #[test]
    fn test_grouped_by_type() {
        let curve = ChurnCurveEstimator::new(ChurnCurveSettings::default()).estimate(&[], 0);
        let projector = LifetimeValueProjector::new(LifetimeValueSettings::default(), 10);
        // Empty curve pools are fully churned: one expected year everywhere
        assert_eq!(curve.expected_future_years(TenureBucket::Year(2)), Some(1.0));

        let payments = vec![
            payment(1, 2.0, 50.0, Some("Individual")),
            payment(2, 1.0, 50.0, Some("Individual")),
            payment(3, 0.5, 80.0, Some("Family")),
            payment(4, 1.0, 10.0, None),
            payment(5, 1.0, 0.0, Some("Student")),
        ];
        let by_type = projector.by_membership_type(&payments, &curve);

        assert_eq!(
            by_type.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Family", "Individual", "Unknown"]
        );
        // (24 x 50 + 600) and (12 x 50 + 600)
        assert_relative_eq!(by_type["Individual"], 1500.0);
        // 6 x 80 + 960
        assert_relative_eq!(by_type["Family"], 1440.0);
        assert_relative_eq!(by_type["Unknown"], 240.0);
    }
}

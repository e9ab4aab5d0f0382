//! Headline tenure figures for the eligible population

use serde::{Deserialize, Serialize};

use super::MembershipRecord;
use crate::stats::{average, median, round_to, saturating_count};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenureSummary {
    /// Eligible members (ambiguous-status records excluded)
    pub member_count: u32,

    /// Members holding an active role at the reference instant
    pub active_count: u32,

    /// Mean tenure in years, two decimals (0 when there are no members)
    pub average_tenure_years: f64,

    /// Median tenure in years, two decimals (0 when there are no members)
    pub median_tenure_years: f64,
}

impl TenureSummary {
    pub fn from_records(records: &[MembershipRecord], now: i64) -> Self {
        let eligible: Vec<&MembershipRecord> = records
            .iter()
            .filter(|r| r.is_observed_at(now))
            .collect();
        let tenures: Vec<f64> = eligible.iter().map(|r| r.tenure_years(now)).collect();

        Self {
            member_count: saturating_count(eligible.len()),
            active_count: saturating_count(eligible.iter().filter(|r| r.is_current(now)).count()),
            average_tenure_years: round_to(average(&tenures).unwrap_or(0.0), 2),
            median_tenure_years: round_to(median(&tenures).unwrap_or(0.0), 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SECONDS_PER_YEAR;

    #[test]
    fn test_summary() {
        let year = SECONDS_PER_YEAR as i64;
        let now = 10 * year;
        let records = vec![
            MembershipRecord::new(1, now - year, None, true),
            MembershipRecord::new(2, now - 4 * year, Some(now - 2 * year), false),
            MembershipRecord::new(3, now - 3 * year, None, true),
            // Ambiguous and future joins are left out
            MembershipRecord::new(4, now - 8 * year, None, false),
            MembershipRecord::new(5, now + year, None, true),
        ];
        let summary = TenureSummary::from_records(&records, now);

        assert_eq!(summary.member_count, 3);
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.average_tenure_years, 2.0);
        assert_eq!(summary.median_tenure_years, 2.0);
    }

    #[test]
    fn test_empty_population() {
        assert_eq!(TenureSummary::from_records(&[], 0), TenureSummary::default());
    }
}

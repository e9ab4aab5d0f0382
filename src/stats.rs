//! Small numeric helpers shared by the analytics components
//!
//! - Mean and median over `f64` samples
//! - Decimal rounding for presentation-ready percentages and currency
//! - Ordered range tables for resolving a value into a tagged bucket

/// Arithmetic mean, or `None` for an empty slice
pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, or `None` for an empty slice
///
/// Even-length samples average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[middle])
    } else {
        Some((sorted[middle - 1] + sorted[middle]) / 2.0)
    }
}

/// Round to a fixed number of decimal places (half away from zero)
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Count as `u32`, saturating at `u32::MAX`
pub fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// One tagged range: `[min, max)`, either bound may be open
#[derive(Debug, Clone, PartialEq)]
pub struct RangeDef<T> {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub id: T,
}

impl<T> RangeDef<T> {
    pub fn new(min: Option<f64>, max: Option<f64>, id: T) -> Self {
        Self { min, max, id }
    }

    fn contains(&self, value: f64) -> bool {
        let above_min = self.min.map_or(true, |min| value >= min);
        let below_max = self.max.map_or(true, |max| value < max);
        above_min && below_max
    }
}

/// Immutable ordered list of ranges, resolved by linear scan
///
/// The first range that contains the value wins, so overlapping definitions
/// resolve to whichever was listed first.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTable<T> {
    ranges: Vec<RangeDef<T>>,
}

impl<T> RangeTable<T> {
    pub fn new(ranges: Vec<RangeDef<T>>) -> Self {
        Self { ranges }
    }

    /// Find the bucket id for a value; NaN never matches
    pub fn resolve(&self, value: f64) -> Option<&T> {
        if value.is_nan() {
            return None;
        }
        self.ranges.iter().find(|r| r.contains(value)).map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_average() {
        assert_eq!(average(&[]), None);
        assert_relative_eq!(average(&[1.0, 2.0, 6.0]).unwrap(), 3.0);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[]), None);
        assert_relative_eq!(median(&[9.0, 1.0, 5.0]).unwrap(), 5.0);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(66.666_666, 1), 66.7);
        assert_eq!(round_to(12.345, 0), 12.0);
        assert_eq!(round_to(0.125, 2), 0.13);
    }

    #[test]
    fn test_saturating_count() {
        assert_eq!(saturating_count(0), 0);
        assert_eq!(saturating_count(42), 42);
        assert_eq!(saturating_count(u32::MAX as usize), u32::MAX);
        if let Some(huge) = (u32::MAX as usize).checked_add(1) {
            assert_eq!(saturating_count(huge), u32::MAX);
        }
    }

    #[test]
    fn test_range_table_first_match_wins() {
        let table = RangeTable::new(vec![
            RangeDef::new(None, Some(18.0), "minor"),
            RangeDef::new(Some(18.0), Some(65.0), "adult"),
            RangeDef::new(Some(60.0), None, "senior"),
        ]);

        assert_eq!(table.resolve(5.0), Some(&"minor"));
        assert_eq!(table.resolve(18.0), Some(&"adult"));
        // 62 sits in both adult and senior; adult is listed first
        assert_eq!(table.resolve(62.0), Some(&"adult"));
        assert_eq!(table.resolve(80.0), Some(&"senior"));
        assert_eq!(table.resolve(f64::NAN), None);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_range_table_gap_returns_none() {
        let table = RangeTable::new(vec![
            RangeDef::new(Some(0.0), Some(1.0), 0u8),
            RangeDef::new(Some(2.0), Some(3.0), 2u8),
        ]);
        assert_eq!(table.resolve(1.5), None);
        assert_eq!(table.resolve(-0.1), None);
    }
}

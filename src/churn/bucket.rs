//! Whole-year tenure buckets shared by the churn curve and lifetime value

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stats::{RangeDef, RangeTable};

/// Tenure bucket: a single year `[y, y+1)` or the open-ended terminal bucket
///
/// Ordering puts every single year before the terminal bucket.
/// Serialized as the short key ("0", "9", "10+") so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TenureBucket {
    /// Members with `y <= tenure < y + 1`
    Year(u8),
    /// Members with `tenure >= start year`
    Terminal(u8),
}

impl TenureBucket {
    /// Axis label, e.g. "0 Years", "1 Year", "10+ Years"
    pub fn label(&self) -> String {
        match self {
            TenureBucket::Year(1) => "1 Year".to_string(),
            TenureBucket::Year(y) => format!("{} Years", y),
            TenureBucket::Terminal(start) => format!("{}+ Years", start),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TenureBucket::Terminal(_))
    }
}

impl fmt::Display for TenureBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenureBucket::Year(y) => write!(f, "{}", y),
            TenureBucket::Terminal(start) => write!(f, "{}+", start),
        }
    }
}

impl From<TenureBucket> for String {
    fn from(bucket: TenureBucket) -> Self {
        bucket.to_string()
    }
}

impl TryFrom<String> for TenureBucket {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let parsed = match trimmed.strip_suffix('+') {
            Some(start) => start.parse().map(TenureBucket::Terminal),
            None => trimmed.parse().map(TenureBucket::Year),
        };
        parsed.map_err(|_| format!("Invalid tenure bucket: {}", value))
    }
}

/// Ordered ranges `[0,1) .. [start-1, start)` followed by `[start, inf)`
pub fn tenure_table(terminal_start_year: u8) -> RangeTable<TenureBucket> {
    let mut ranges: Vec<RangeDef<TenureBucket>> = (0..terminal_start_year)
        .map(|y| RangeDef::new(Some(y as f64), Some(y as f64 + 1.0), TenureBucket::Year(y)))
        .collect();
    ranges.push(RangeDef::new(
        Some(terminal_start_year as f64),
        None,
        TenureBucket::Terminal(terminal_start_year),
    ));
    RangeTable::new(ranges)
}

//! Churn-rate curve by tenure year

mod bucket;
mod curve;

pub use bucket::{tenure_table, TenureBucket};
pub use curve::{ChurnCurve, ChurnCurveEstimator, ChurnCurvePoint, TenureCounts};

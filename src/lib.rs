//! Retention Analytics - cohort survival, churn curves and lifetime value for membership data
//!
//! This library provides:
//! - Monthly join cohorts with partial-observability aware survival counts
//! - Retention matrix (percent retained per month offset)
//! - Smoothed churn-rate curve by tenure year with floor/cap guards
//! - Lifetime value projection per tenure bucket and membership type
//! - Annual cohort summaries and membership inflow/outflow
//! - Report caching keyed by bucketed reference instant

pub mod cache;
pub mod calendar;
pub mod churn;
pub mod cohort;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifetime;
pub mod membership;
pub mod stats;

// Re-export commonly used types
pub use cache::{InMemoryMetricCache, MetricCache};
pub use calendar::ReportingZone;
pub use churn::{ChurnCurve, ChurnCurveEstimator, ChurnCurvePoint, TenureBucket};
pub use cohort::{Cohort, CohortBuilder, Granularity, RetentionMatrixCalculator, RetentionMatrixRow};
pub use config::AnalyticsConfig;
pub use engine::{RetentionEngine, RetentionReport};
pub use error::{AnalyticsError, AnalyticsResult};
pub use lifetime::{LifetimeValueBucket, LifetimeValueProjector};
pub use membership::{MemberPayment, MembershipRecord, MembershipSnapshot, TenureSummary};

//! Join cohorts: monthly survival, retention matrix, annual summaries and flow

mod builder;
mod matrix;
pub mod annual;
pub mod flow;

pub use builder::{Cohort, CohortBuilder};
pub use matrix::{RetentionMatrixCalculator, RetentionMatrixRow};
pub use annual::{annual_cohorts, AnnualCohortRow};
pub use flow::{membership_flow, FlowEntry, Granularity, MembershipFlow};

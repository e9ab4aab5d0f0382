//! Lifetime value projection from tenure and the churn curve

mod by_type;
mod projector;

pub use projector::{LifetimeValueBucket, LifetimeValueProjector, LifetimeValueTable, MemberValue};

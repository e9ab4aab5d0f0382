//! Error types for configuration and record loading
//!
//! The analytics computations themselves never fail: degenerate inputs are
//! handled with floors, defaults and `None` cells. Errors only arise at the
//! edges, when reading files or validating configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UTC offset: {seconds} seconds")]
    InvalidTimezone { seconds: i32 },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Instant {0} is outside the supported calendar range")]
    InvalidInstant(i64),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl AnalyticsError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

//! Analytics configuration: cohort window, churn curve guards and cache policy

pub mod loader;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calendar::ReportingZone;
use crate::error::{AnalyticsError, AnalyticsResult};

/// Container for all engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub cohort: CohortSettings,
    pub churn: ChurnCurveSettings,
    pub lifetime: LifetimeValueSettings,
    pub cache: CacheSettings,
}

/// Cohort window and calendar settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortSettings {
    /// Number of months of join cohorts to keep, and the highest month offset tracked
    pub months_back: u32,

    /// Offset of the reporting timezone from UTC, in seconds
    pub utc_offset_seconds: i32,

    /// IANA zone name (e.g. "America/New_York"); overrides `utc_offset_seconds` when set
    pub timezone: Option<String>,
}

impl Default for CohortSettings {
    fn default() -> Self {
        Self {
            months_back: 24,
            utc_offset_seconds: 0,
            timezone: None,
        }
    }
}

/// Guards and windows for the churn curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnCurveSettings {
    /// Highest tenure year tracked when counting entered/churned members
    pub max_year: u32,

    /// Half-width of the pooling window for years 1 and above
    pub smoothing_radius: u32,

    /// First tenure year folded into the terminal long-tenure bucket
    pub terminal_start_year: u32,

    /// Minimum churn rate used when projecting years 0..terminal_start_year
    pub churn_floor: f64,

    /// Cap on expected future years for years 0..terminal_start_year
    pub max_expected_years: f64,

    /// Minimum churn rate for the terminal bucket
    pub terminal_churn_floor: f64,

    /// Cap on expected future years for the terminal bucket
    pub terminal_max_expected_years: f64,
}

impl Default for ChurnCurveSettings {
    fn default() -> Self {
        Self {
            max_year: 15,
            smoothing_radius: 1,
            terminal_start_year: 10,
            churn_floor: 0.03,
            max_expected_years: 15.0,
            terminal_churn_floor: 0.02,
            terminal_max_expected_years: 20.0,
        }
    }
}

/// Lifetime value projection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeValueSettings {
    /// Expected future years used when a bucket has no churn curve point
    pub fallback_expected_years: f64,
}

impl Default for LifetimeValueSettings {
    fn default() -> Self {
        Self {
            fallback_expected_years: 0.5,
        }
    }
}

/// Cache policy for computed reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of a cached report
    pub ttl_seconds: u64,

    /// Reference instants are floored to this granularity when building cache keys
    pub instant_granularity_seconds: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 1800,
            instant_granularity_seconds: 3600,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self::default_dashboard()
    }
}

impl AnalyticsConfig {
    /// Settings matching the membership dashboard defaults
    pub fn default_dashboard() -> Self {
        Self {
            cohort: CohortSettings::default(),
            churn: ChurnCurveSettings::default(),
            lifetime: LifetimeValueSettings::default(),
            cache: CacheSettings::default(),
        }
    }

    /// Load overrides from the default parameters file
    pub fn from_csv() -> AnalyticsResult<Self> {
        Self::from_csv_path(Path::new(loader::DEFAULT_PARAMETERS_PATH))
    }

    /// Load overrides from a specific parameters file and validate the result
    pub fn from_csv_path(path: &Path) -> AnalyticsResult<Self> {
        let parameters = loader::load_parameters(path)?;
        let config = Self::from_parameters(&parameters)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `parameter -> value` overrides on top of the defaults
    ///
    /// Unknown parameter names are logged and ignored. The parameters file is
    /// numeric only, so a named timezone is set on `cohort.timezone` directly.
    pub fn from_parameters(parameters: &BTreeMap<String, f64>) -> AnalyticsResult<Self> {
        let mut config = Self::default_dashboard();

        for (name, &value) in parameters {
            match name.as_str() {
                "months_back" => config.cohort.months_back = as_u32(name, value)?,
                "utc_offset_seconds" => config.cohort.utc_offset_seconds = as_i32(name, value)?,
                "max_year" => config.churn.max_year = as_u32(name, value)?,
                "smoothing_radius" => config.churn.smoothing_radius = as_u32(name, value)?,
                "terminal_start_year" => config.churn.terminal_start_year = as_u32(name, value)?,
                "churn_floor" => config.churn.churn_floor = value,
                "max_expected_years" => config.churn.max_expected_years = value,
                "terminal_churn_floor" => config.churn.terminal_churn_floor = value,
                "terminal_max_expected_years" => config.churn.terminal_max_expected_years = value,
                "fallback_expected_years" => config.lifetime.fallback_expected_years = value,
                "cache_ttl_seconds" => config.cache.ttl_seconds = as_u32(name, value)? as u64,
                "instant_granularity_seconds" => {
                    config.cache.instant_granularity_seconds = as_u32(name, value)? as i64
                }
                other => log::warn!("Ignoring unknown analytics parameter '{}'", other),
            }
        }

        Ok(config)
    }

    /// Reject settings that would make the floors/caps meaningless
    pub fn validate(&self) -> AnalyticsResult<()> {
        let c = &self.churn;

        if self.cohort.months_back == 0 {
            return Err(AnalyticsError::invalid_parameter("months_back", "must be at least 1"));
        }
        ReportingZone::from_settings(self.cohort.timezone.as_deref(), self.cohort.utc_offset_seconds)?;
        if c.terminal_start_year == 0 || c.terminal_start_year > c.max_year {
            return Err(AnalyticsError::invalid_parameter(
                "terminal_start_year",
                format!("must be between 1 and max_year ({})", c.max_year),
            ));
        }
        if c.terminal_start_year > u8::MAX as u32 {
            return Err(AnalyticsError::invalid_parameter("terminal_start_year", "must fit in a byte"));
        }
        for (name, floor) in [
            ("churn_floor", c.churn_floor),
            ("terminal_churn_floor", c.terminal_churn_floor),
        ] {
            if !(floor > 0.0 && floor <= 1.0) {
                return Err(AnalyticsError::invalid_parameter(name, "must be in (0, 1]"));
            }
        }
        for (name, cap) in [
            ("max_expected_years", c.max_expected_years),
            ("terminal_max_expected_years", c.terminal_max_expected_years),
            ("fallback_expected_years", self.lifetime.fallback_expected_years),
        ] {
            if !(cap.is_finite() && cap > 0.0) {
                return Err(AnalyticsError::invalid_parameter(name, "must be a positive number"));
            }
        }
        if self.cache.instant_granularity_seconds <= 0 {
            return Err(AnalyticsError::invalid_parameter(
                "instant_granularity_seconds",
                "must be positive",
            ));
        }

        Ok(())
    }
}

fn as_u32(name: &str, value: f64) -> AnalyticsResult<u32> {
    if value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
        return Err(AnalyticsError::invalid_parameter(name, "must be a non-negative whole number"));
    }
    Ok(value as u32)
}

fn as_i32(name: &str, value: f64) -> AnalyticsResult<i32> {
    if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(AnalyticsError::invalid_parameter(name, "must be a whole number"));
    }
    Ok(value as i32)
}

//! Retention matrix: survival counts as percentages of each cohort

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Cohort;
use crate::stats::round_to;

/// One cohort's retention curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionMatrixRow {
    pub cohort_key: String,
    pub label: String,
    pub joined: u32,

    /// Percent retained per month offset, one decimal; `None` = not yet observable
    pub retention: Vec<Option<f64>>,
}

impl RetentionMatrixRow {
    /// Number of offsets with a known value
    pub fn observed_len(&self) -> usize {
        self.retention.iter().take_while(|cell| cell.is_some()).count()
    }
}

/// Converts cohort survival counts into percentages
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionMatrixCalculator;

impl RetentionMatrixCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Rows in ascending cohort-key order
    pub fn calculate(&self, cohorts: &BTreeMap<String, Cohort>) -> Vec<RetentionMatrixRow> {
        cohorts.values().map(|cohort| self.row(cohort)).collect()
    }

    fn row(&self, cohort: &Cohort) -> RetentionMatrixRow {
        let joined = cohort.joined_count;
        let retention = (0..cohort.survival_counts.len())
            .map(|offset| {
                if joined == 0 {
                    return None;
                }
                cohort
                    .survivors(offset)
                    .map(|survivors| round_to(survivors as f64 / joined as f64 * 100.0, 1))
            })
            .collect();

        RetentionMatrixRow {
            cohort_key: cohort.cohort_key.clone(),
            label: cohort.label(),
            joined,
            retention,
        }
    }
}

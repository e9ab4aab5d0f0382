//! CSV-based parameter loader
//!
//! Reads `parameter,value` rows from data/analytics_parameters.csv

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Default path to the parameters file
pub const DEFAULT_PARAMETERS_PATH: &str = "data/analytics_parameters.csv";

/// Load parameter overrides from a CSV file
/// Returns BTreeMap<parameter_name, value>
pub fn load_parameters(path: &Path) -> AnalyticsResult<BTreeMap<String, f64>> {
    let file = File::open(path)?;
    load_parameters_from_reader(file)
}

/// Load parameter overrides from any reader
pub fn load_parameters_from_reader<R: std::io::Read>(
    reader: R,
) -> AnalyticsResult<BTreeMap<String, f64>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut parameters = BTreeMap::new();

    for result in csv_reader.records() {
        let record = result?;
        let name = record.get(0).unwrap_or_default().to_string();
        if name.is_empty() {
            continue;
        }
        let raw = record.get(1).unwrap_or_default();
        let value: f64 = raw
            .parse()
            .map_err(|_| AnalyticsError::invalid_parameter(&name, format!("'{}' is not a number", raw)))?;
        parameters.insert(name, value);
    }

    Ok(parameters)
}

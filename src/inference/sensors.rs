//! Per-class summaries of clean-table sensor columns

use crate::error::{QcError, Result};
use crate::utils::data_loader::{column_names, column_to_f64};
use crate::utils::split_target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Five-number summary plus mean of one sensor within one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub class: i64,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

/// Feature columns of the clean table, at most `limit`
pub fn sensor_columns(clean: &polars::prelude::DataFrame, target: &str, limit: usize) -> Vec<String> {
    column_names(clean)
        .into_iter()
        .filter(|name| name != target)
        .take(limit)
        .collect()
}

/// Summaries of `column` for each label value, ordered by label. Null
/// cells are skipped.
pub fn summarize_sensor(
    clean: &polars::prelude::DataFrame,
    column: &str,
    target: &str,
) -> Result<Vec<SensorSummary>> {
    if column == target {
        return Err(QcError::FeatureNotFound(column.to_string()));
    }

    let values = column_to_f64(clean, column)?;
    let (_, labels) = split_target(clean, target)?;

    let mut groups: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (value, &label) in values.into_iter().zip(labels.iter()) {
        let entry = groups.entry(label).or_default();
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            entry.push(v);
        }
    }

    Ok(groups
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(class, mut values)| {
            values.sort_by(|a, b| a.total_cmp(b));
            let n = values.len();
            SensorSummary {
                class,
                count: n,
                min: values[0],
                q1: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q3: quantile(&values, 0.75),
                max: values[n - 1],
                mean: values.iter().sum::<f64>() / n as f64,
            }
        })
        .collect())
}

/// Linearly interpolated quantile of sorted, non-empty values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

//! Raw sensor table → clean feature table

use crate::error::{QcError, Result};
use crate::utils::data_loader::{column_names, column_to_f64, load_csv, split_target, write_csv};
use super::{Imputer, OneHotEncoder, PreprocessingConfig};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// What a preprocessing run did to the table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessingReport {
    pub n_rows: usize,
    pub n_input_columns: usize,
    pub dropped_time_column: bool,
    /// Column the label was read from
    pub label_column: String,
    /// Indicator columns produced from the phase column
    pub phase_columns: Vec<String>,
    /// Feature columns dropped for exceeding the missing-value threshold
    pub dropped_columns: Vec<String>,
    /// Number of cells filled by the imputer
    pub imputed_cells: usize,
    /// Feature columns in the clean table (label excluded)
    pub n_features: usize,
}

/// Clean feature table with the label appended as the last column
#[derive(Debug, Clone)]
pub struct CleanDataset {
    pub frame: DataFrame,
    pub target_column: String,
    pub report: PreprocessingReport,
}

impl CleanDataset {
    /// Feature columns and labels
    pub fn split(&self) -> Result<(DataFrame, Array1<i64>)> {
        split_target(&self.frame, &self.target_column)
    }

    pub fn feature_names(&self) -> Vec<String> {
        column_names(&self.frame)
            .into_iter()
            .filter(|name| name != &self.target_column)
            .collect()
    }
}

/// Cleans raw SECOM-style tables
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessingConfig,
}

impl Preprocessor {
    /// Create a preprocessor with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preprocessor with custom configuration
    pub fn with_config(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Load a raw CSV and clean it
    pub fn load_and_preprocess(&self, path: &Path) -> Result<CleanDataset> {
        info!(path = %path.display(), "Loading raw sensor table");
        let raw = load_csv(path)?;
        self.preprocess(&raw)
    }

    /// Clean `input` and write the clean table to `output`
    pub fn run(&self, input: &Path, output: &Path) -> Result<CleanDataset> {
        let mut clean = self.load_and_preprocess(input)?;
        write_csv(&mut clean.frame, output)?;
        info!(
            path = %output.display(),
            rows = clean.report.n_rows,
            cols = clean.frame.width(),
            "Clean table written"
        );
        Ok(clean)
    }

    /// Clean an in-memory raw table
    pub fn preprocess(&self, raw: &DataFrame) -> Result<CleanDataset> {
        let start = Instant::now();
        let cfg = &self.config;
        let mut report = PreprocessingReport {
            n_rows: raw.height(),
            n_input_columns: raw.width(),
            ..Default::default()
        };

        let names = column_names(raw);
        let mut df = raw.clone();

        // 1. timestamp carries no signal
        if names.iter().any(|n| n == &cfg.time_column) {
            df = df.drop(&cfg.time_column)?;
            report.dropped_time_column = true;
        }

        // 2. label column by name, else positionally last
        let remaining = column_names(&df);
        let label_column = if remaining.iter().any(|n| n == &cfg.label_column) {
            cfg.label_column.clone()
        } else {
            remaining.last().cloned().ok_or_else(|| {
                QcError::PreprocessingError("table has no columns".to_string())
            })?
        };
        debug!(label_column = %label_column, "Resolved label column");
        report.label_column = label_column.clone();

        // 3. {-1, 1} -> {0, 1}
        let labels: Vec<Option<i64>> = column_to_f64(&df, &label_column)?
            .into_iter()
            .map(|v| v.map(remap_label))
            .collect();
        let mut features = df.drop(&label_column)?;

        // 4. phase indicators
        if column_names(&features).iter().any(|n| n == &cfg.phase_column) {
            let mut encoder = OneHotEncoder::new(&cfg.phase_column)
                .with_drop_first(cfg.drop_first_phase);
            features = encoder.fit_transform(&features)?;
            report.phase_columns = encoder.output_columns();
        }

        // 5. prune sparse columns
        let numeric = to_numeric(&features)?;
        let height = numeric.height();
        let mut kept: Vec<Column> = Vec::with_capacity(numeric.width());
        for column in numeric.get_columns() {
            let ratio = if height == 0 {
                0.0
            } else {
                column.null_count() as f64 / height as f64
            };
            if ratio > cfg.max_missing_ratio {
                report.dropped_columns.push(column.name().to_string());
            } else {
                report.imputed_cells += column.null_count();
                kept.push(column.clone());
            }
        }
        let kept = DataFrame::new(kept)?;

        // 6. median fill, statistics from this same table
        let kept_names = column_names(&kept);
        let kept_refs: Vec<&str> = kept_names.iter().map(|s| s.as_str()).collect();
        let mut imputer = Imputer::new(cfg.impute_strategy.clone());
        let imputed = imputer.fit_transform(&kept, &kept_refs)?;

        // 7. label goes last under its own name
        let mut columns: Vec<Column> = imputed.get_columns().to_vec();
        columns.push(Column::new(cfg.target_column.as_str().into(), labels));
        let frame = DataFrame::new(columns)?;

        report.n_features = frame.width() - 1;
        info!(
            rows = report.n_rows,
            input_columns = report.n_input_columns,
            dropped_columns = report.dropped_columns.len(),
            phase_columns = report.phase_columns.len(),
            imputed_cells = report.imputed_cells,
            features = report.n_features,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Preprocessing complete"
        );

        Ok(CleanDataset {
            frame,
            target_column: cfg.target_column.clone(),
            report,
        })
    }
}

/// Raw fail/pass encoding to defect indicator; other codes pass through
fn remap_label(raw: f64) -> i64 {
    let code = raw.round() as i64;
    if code == -1 { 0 } else { code }
}

/// Cast every column to f64; non-numeric and `NaN` cells become null
fn to_numeric(df: &DataFrame) -> Result<DataFrame> {
    let columns = df
        .get_columns()
        .iter()
        .map(|c| {
            let cast = c.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = cast
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect();
            Ok(Column::new(c.name().clone(), values))
        })
        .collect::<PolarsResult<Vec<Column>>>()?;
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        df!(
            "Time" => &["2008-07-19 11:55:00", "2008-07-19 12:32:00", "2008-07-19 13:17:00", "2008-07-19 14:43:00"],
            "0" => &[Some(3030.93), None, Some(2932.61), Some(2988.72)],
            "1" => &[None, None, None, Some(2479.90)],
            "2" => &[Some(2187.7), Some(2199.0), Some(2233.4), Some(2230.0)],
            "Pass/Fail" => &[-1i64, -1, 1, -1]
        )
        .unwrap()
    }

    #[test]
    fn test_remap_label() {
        assert_eq!(remap_label(-1.0), 0);
        assert_eq!(remap_label(1.0), 1);
    }

    #[test]
    fn test_preprocess_basic() {
        let clean = Preprocessor::new().preprocess(&raw_frame()).unwrap();

        assert!(clean.report.dropped_time_column);
        assert_eq!(clean.report.label_column, "Pass/Fail");
        assert_eq!(clean.report.dropped_columns, vec!["1".to_string()]);
        assert_eq!(clean.feature_names(), vec!["0".to_string(), "2".to_string()]);

        let names = column_names(&clean.frame);
        assert_eq!(names.last().map(String::as_str), Some("Target"));

        let (features, y) = clean.split().unwrap();
        assert_eq!(y.to_vec(), vec![0, 0, 1, 0]);
        // median of 3030.93, 2932.61, 2988.72
        let col0 = column_to_f64(&features, "0").unwrap();
        assert_eq!(col0[1], Some(2988.72));
        assert_eq!(clean.report.imputed_cells, 1);
    }

    #[test]
    fn test_label_falls_back_to_last_column() {
        let df = df!(
            "a" => &[1.0, 2.0],
            "label" => &[1i64, -1]
        )
        .unwrap();
        let clean = Preprocessor::new().preprocess(&df).unwrap();
        assert_eq!(clean.report.label_column, "label");
        let (_, y) = clean.split().unwrap();
        assert_eq!(y.to_vec(), vec![1, 0]);
    }

    #[test]
    fn test_column_at_threshold_is_kept() {
        let df = df!(
            "half" => &[Some(1.0), None, Some(3.0), None],
            "Pass/Fail" => &[-1i64, 1, -1, 1]
        )
        .unwrap();
        let clean = Preprocessor::new().preprocess(&df).unwrap();
        assert!(clean.report.dropped_columns.is_empty());
        assert_eq!(clean.report.n_features, 1);
    }

    #[test]
    fn test_nan_cells_count_as_missing() {
        let df = df!(
            "0" => &[1.0, f64::NAN, 3.0, 5.0],
            "1" => &[f64::NAN, f64::NAN, 7.0, f64::NAN],
            "Pass/Fail" => &[-1i64, 1, -1, 1]
        )
        .unwrap();
        let clean = Preprocessor::new().preprocess(&df).unwrap();

        assert_eq!(clean.report.dropped_columns, vec!["1".to_string()]);
        assert_eq!(clean.report.imputed_cells, 1);
        let col0 = column_to_f64(&clean.frame, "0").unwrap();
        assert_eq!(col0, vec![Some(1.0), Some(3.0), Some(3.0), Some(5.0)]);
    }

    #[test]
    fn test_empty_table_fails() {
        let df = DataFrame::empty();
        assert!(Preprocessor::new().preprocess(&df).is_err());
    }
}

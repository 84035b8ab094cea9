//! Missing value imputation

use crate::error::{QcError, Result};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for imputing missing values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Replace with column mean
    Mean,
    /// Replace with column median
    Median,
    /// Replace with a constant value
    Constant(f64),
}

/// Column-wise imputer for numeric data.
///
/// Works either on named DataFrame columns or positionally on a matrix
/// where missing cells are `NaN`. A column with no observed value has no
/// statistic; its fill value is `None` until a fallback is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    columns: Vec<String>,
    fill_values: Vec<Option<f64>>,
    is_fitted: bool,
}

impl Imputer {
    /// Create a new imputer with the specified strategy
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            columns: Vec::new(),
            fill_values: Vec::new(),
            is_fitted: false,
        }
    }

    /// Fitted imputer with known positional fill values
    pub fn from_fill_values(strategy: ImputeStrategy, fill_values: &[f64]) -> Self {
        Self {
            strategy,
            columns: Vec::new(),
            fill_values: fill_values.iter().copied().map(Some).collect(),
            is_fitted: true,
        }
    }

    pub fn strategy(&self) -> &ImputeStrategy {
        &self.strategy
    }

    /// Fitted statistics, one per column
    pub fn fill_values(&self) -> &[Option<f64>] {
        &self.fill_values
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fit the imputer to named columns of a frame
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        self.columns.clear();
        self.fill_values.clear();

        for col_name in columns {
            let column = df
                .column(col_name)
                .map_err(|_| QcError::FeatureNotFound(col_name.to_string()))?;
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            let ca = series.f64()?;

            let fill = match &self.strategy {
                ImputeStrategy::Mean => ca.mean(),
                ImputeStrategy::Median => ca.median(),
                ImputeStrategy::Constant(v) => Some(*v),
            };

            self.columns.push(col_name.to_string());
            self.fill_values.push(fill);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Fill nulls in the fitted columns; other columns pass through
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(QcError::ModelNotFitted);
        }

        let mut columns: Vec<Column> = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let name = column.name().as_str();
            let fill = self
                .columns
                .iter()
                .position(|c| c == name)
                .map(|idx| self.fill_values[idx]);

            match fill {
                Some(fill) => {
                    let series = column.as_materialized_series().cast(&DataType::Float64)?;
                    let fill = fill.unwrap_or(0.0);
                    let filled: Vec<f64> = series
                        .f64()?
                        .into_iter()
                        .map(|v| v.unwrap_or(fill))
                        .collect();
                    columns.push(Column::new(column.name().clone(), filled));
                }
                None => columns.push(column.clone()),
            }
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Fit positionally on a matrix; `NaN` marks a missing cell
    pub fn fit_array(&mut self, x: &Array2<f64>) -> &mut Self {
        self.columns.clear();
        self.fill_values = x
            .columns()
            .into_iter()
            .map(|col| {
                let mut observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                match &self.strategy {
                    ImputeStrategy::Mean => {
                        if observed.is_empty() {
                            None
                        } else {
                            Some(observed.iter().sum::<f64>() / observed.len() as f64)
                        }
                    }
                    ImputeStrategy::Median => median(&mut observed),
                    ImputeStrategy::Constant(v) => Some(*v),
                }
            })
            .collect();
        self.is_fitted = true;
        self
    }

    /// Replace statistics that could not be fitted with `fallback[j]`
    pub fn with_fallback(mut self, fallback: &[f64]) -> Self {
        for (fill, &alt) in self.fill_values.iter_mut().zip(fallback.iter()) {
            if fill.is_none() {
                *fill = Some(alt);
            }
        }
        self
    }

    /// Fill `NaN` cells column by column. Columns without a statistic are
    /// filled with `0.0`.
    pub fn transform_array(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(QcError::ModelNotFitted);
        }
        if x.ncols() != self.fill_values.len() {
            return Err(QcError::ShapeError {
                expected: format!("{} columns", self.fill_values.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut col, fill) in out.columns_mut().into_iter().zip(self.fill_values.iter()) {
            let fill = fill.unwrap_or(0.0);
            col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(out)
    }

    /// Fit and transform a matrix in one step
    pub fn fit_transform_array(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit_array(x);
        self.transform_array(x)
    }
}

/// Median of the values (average of the two middle values for even counts)
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 0 {
        Some((values[n / 2 - 1] + values[n / 2]) / 2.0)
    } else {
        Some(values[n / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_imputer_creation() {
        let imputer = Imputer::new(ImputeStrategy::Median);
        assert!(!imputer.is_fitted());
    }

    #[test]
    fn test_median_imputation() {
        let df = DataFrame::new(vec![
            Column::new("a".into(), &[Some(1.0), None, Some(3.0), Some(10.0)]),
            Column::new("b".into(), &[Some(2.0), Some(2.0), None, Some(4.0)]),
        ])
        .unwrap();

        let mut imputer = Imputer::new(ImputeStrategy::Median);
        let result = imputer.fit_transform(&df, &["a", "b"]).unwrap();

        let a = result.column("a").unwrap().f64().unwrap();
        assert_eq!(a.get(1), Some(3.0));
        let b = result.column("b").unwrap().f64().unwrap();
        assert_eq!(b.get(2), Some(2.0));
        assert_eq!(result.column("a").unwrap().null_count(), 0);
    }

    #[test]
    fn test_transform_leaves_unfitted_columns() {
        let df = DataFrame::new(vec![
            Column::new("a".into(), &[Some(1.0), None]),
            Column::new("label".into(), &[Some(1i64), None]),
        ])
        .unwrap();

        let mut imputer = Imputer::new(ImputeStrategy::Mean);
        let result = imputer.fit_transform(&df, &["a"]).unwrap();
        assert_eq!(result.column("label").unwrap().null_count(), 1);
    }

    #[test]
    fn test_array_median_even_count() {
        let x = array![[1.0, f64::NAN], [2.0, 5.0], [f64::NAN, 7.0], [4.0, f64::NAN], [8.0, 9.0]];
        let mut imputer = Imputer::new(ImputeStrategy::Median);
        let out = imputer.fit_transform_array(&x).unwrap();

        // column 0 observed: 1, 2, 4, 8 -> median 3
        assert_eq!(out[[2, 0]], 3.0);
        // column 1 observed: 5, 7, 9 -> median 7
        assert_eq!(out[[0, 1]], 7.0);
        assert_eq!(out[[3, 1]], 7.0);
        assert!(out.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_all_missing_column_uses_fallback() {
        let x = array![[f64::NAN, 1.0], [f64::NAN, 2.0]];
        let mut imputer = Imputer::new(ImputeStrategy::Median);
        imputer.fit_array(&x);
        assert_eq!(imputer.fill_values()[0], None);

        let imputer = imputer.with_fallback(&[42.0, 0.0]);
        let out = imputer.transform_array(&x).unwrap();
        assert_eq!(out[[0, 0]], 42.0);
        assert_eq!(out[[1, 1]], 2.0);
    }

    #[test]
    fn test_from_fill_values() {
        let imputer = Imputer::from_fill_values(ImputeStrategy::Median, &[5.0, 6.0]);
        assert!(imputer.is_fitted());
        let out = imputer.transform_array(&array![[f64::NAN, 1.0], [2.0, f64::NAN]]).unwrap();
        assert_eq!(out, array![[5.0, 1.0], [2.0, 6.0]]);
    }

    #[test]
    fn test_transform_array_shape_mismatch() {
        let mut imputer = Imputer::new(ImputeStrategy::Median);
        imputer.fit_array(&array![[1.0, 2.0]]);
        assert!(imputer.transform_array(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_median_helper() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0]), Some(2.5));
    }
}

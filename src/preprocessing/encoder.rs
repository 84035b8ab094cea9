//! One-hot encoding of a categorical column

use crate::error::{QcError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One-hot encoder for a single categorical column.
///
/// Indicator columns are named `{column}_{category}` and appended after
/// the remaining columns; the source column is removed. Rows with a null
/// category get zeros in every indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    column: String,
    drop_first: bool,
    categories: Vec<String>,
    is_fitted: bool,
}

impl OneHotEncoder {
    /// Create a new encoder for `column`
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            drop_first: false,
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    /// Skip the indicator of the first (sorted) category
    pub fn with_drop_first(mut self, drop_first: bool) -> Self {
        self.drop_first = drop_first;
        self
    }

    /// All observed categories, sorted
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Names of the indicator columns produced by `transform`
    pub fn output_columns(&self) -> Vec<String> {
        self.encoded_categories()
            .iter()
            .map(|cat| format!("{}_{}", self.column, cat))
            .collect()
    }

    fn encoded_categories(&self) -> &[String] {
        if self.drop_first && !self.categories.is_empty() {
            &self.categories[1..]
        } else {
            &self.categories
        }
    }

    fn category_values(&self, df: &DataFrame) -> Result<Vec<Option<String>>> {
        let column = df
            .column(&self.column)
            .map_err(|_| QcError::FeatureNotFound(self.column.clone()))?;
        let series = column.as_materialized_series().cast(&DataType::String)?;
        let values = series
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect();
        Ok(values)
    }

    /// Collect the categories of the column
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let mut categories: Vec<String> = self.category_values(df)?.into_iter().flatten().collect();
        categories.sort_by(compare_categories);
        categories.dedup();

        self.categories = categories;
        self.is_fitted = true;
        Ok(self)
    }

    /// Replace the column with its indicator columns
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(QcError::ModelNotFitted);
        }

        let values = self.category_values(df)?;
        let mut columns: Vec<Column> = df
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != self.column)
            .cloned()
            .collect();

        for (category, name) in self.encoded_categories().iter().zip(self.output_columns()) {
            let indicator: Vec<f64> = values
                .iter()
                .map(|v| if v.as_deref() == Some(category.as_str()) { 1.0 } else { 0.0 })
                .collect();
            columns.push(Column::new(name.into(), indicator));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }
}

/// Numeric order when both labels parse as numbers, lexical otherwise
fn compare_categories(a: &String, b: &String) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}

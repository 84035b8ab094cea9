//! Preprocessing configuration

use serde::{Deserialize, Serialize};
use super::ImputeStrategy;

/// Configuration for cleaning a raw sensor table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Non-predictive timestamp column, dropped when present
    pub time_column: String,

    /// Raw label column; the last column is used when it is absent
    pub label_column: String,

    /// Categorical process-phase column, one-hot encoded when present
    pub phase_column: String,

    /// Name of the remapped {0, 1} label in the clean table
    pub target_column: String,

    /// Columns with a strictly larger missing fraction are dropped
    pub max_missing_ratio: f64,

    /// Strategy for filling the remaining missing values
    pub impute_strategy: ImputeStrategy,

    /// Drop the first phase level to avoid collinear indicators
    pub drop_first_phase: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            time_column: "Time".to_string(),
            label_column: "Pass/Fail".to_string(),
            phase_column: "Phase".to_string(),
            target_column: "Target".to_string(),
            max_missing_ratio: 0.5,
            impute_strategy: ImputeStrategy::Median,
            drop_first_phase: true,
        }
    }
}

impl PreprocessingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the raw label column
    pub fn with_label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = name.into();
        self
    }

    /// Builder method to set the missing-value threshold
    pub fn with_max_missing_ratio(mut self, ratio: f64) -> Self {
        self.max_missing_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the imputation strategy
    pub fn with_impute_strategy(mut self, strategy: ImputeStrategy) -> Self {
        self.impute_strategy = strategy;
        self
    }
}

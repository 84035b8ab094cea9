//! Inference configuration

use crate::artifacts::ArtifactPaths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Feature count of the SECOM clean table, used when a model does not
/// record its own
pub const DEFAULT_EXPECTED_FEATURES: usize = 567;

/// Source of fill values for missing cells in an incoming batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchImputation {
    /// Medians of the batch itself
    PerBatch,
    /// Medians recorded from the training partition
    TrainingMedians,
}

/// Configuration for the inference service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Expected feature count when the model does not say
    pub expected_features: usize,

    /// Threshold on the defect probability; the model's own decision when `None`
    pub classification_threshold: Option<f64>,

    /// How missing cells are filled before prediction
    pub imputation: BatchImputation,

    /// Label column stripped from uploaded batches before analysis
    pub target_column: String,

    /// Model artifact location
    pub model_path: PathBuf,

    /// Reference metrics location
    pub metrics_path: PathBuf,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::from_paths(&ArtifactPaths::default())
    }
}

impl InferenceConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration reading artifacts from `paths`
    pub fn from_paths(paths: &ArtifactPaths) -> Self {
        Self {
            expected_features: DEFAULT_EXPECTED_FEATURES,
            classification_threshold: None,
            imputation: BatchImputation::PerBatch,
            target_column: "Target".to_string(),
            model_path: paths.model(),
            metrics_path: paths.metrics(),
        }
    }

    /// Builder method to set the decision threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.classification_threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    /// Builder method to set the imputation source
    pub fn with_imputation(mut self, imputation: BatchImputation) -> Self {
        self.imputation = imputation;
        self
    }

    /// Builder method to set the model path
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    /// Builder method to set the metrics path
    pub fn with_metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paths() {
        let paths = ArtifactPaths::new("d", "r");
        let config = InferenceConfig::from_paths(&paths);
        assert_eq!(config.model_path, PathBuf::from("r/final_model_smote_rf.json"));
        assert_eq!(config.metrics_path, PathBuf::from("r/final_metrics.json"));
        assert_eq!(config.expected_features, 567);
        assert_eq!(config.imputation, BatchImputation::PerBatch);
        assert_eq!(config.classification_threshold, None);
    }

    #[test]
    fn test_threshold_clamped() {
        let config = InferenceConfig::from_paths(&ArtifactPaths::new("d", "r")).with_threshold(1.5);
        assert_eq!(config.classification_threshold, Some(1.0));
    }
}

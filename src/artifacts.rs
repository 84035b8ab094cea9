//! Artifact locations shared by the pipeline stages
//!
//! Stages communicate only through files: the preprocessor writes the
//! clean table, the trainer writes the model, the reference metrics and
//! the held-out test partition, and the inference service reads them back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default raw SECOM export
pub const RAW_DATA_FILE: &str = "uci-secom.csv";
/// Default cleaned table
pub const CLEAN_DATA_FILE: &str = "secom_preprocessed.csv";
/// Default fitted model
pub const MODEL_FILE: &str = "final_model_smote_rf.json";
/// Default reference metrics
pub const METRICS_FILE: &str = "final_metrics.json";
/// Default held-out test partition
pub const TEST_SET_FILE: &str = "test_dataset.csv";

/// File locations for every pipeline artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            data_dir: std::env::var("QC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            results_dir: std::env::var("QC_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("results")),
        }
    }
}

impl ArtifactPaths {
    /// Paths rooted at explicit directories (ignores the environment)
    pub fn new(data_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    /// Builder method to set the results directory
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn raw_data(&self) -> PathBuf {
        self.data_dir.join(RAW_DATA_FILE)
    }

    pub fn clean_data(&self) -> PathBuf {
        self.data_dir.join(CLEAN_DATA_FILE)
    }

    pub fn model(&self) -> PathBuf {
        self.results_dir.join(MODEL_FILE)
    }

    pub fn metrics(&self) -> PathBuf {
        self.results_dir.join(METRICS_FILE)
    }

    pub fn test_set(&self) -> PathBuf {
        self.results_dir.join(TEST_SET_FILE)
    }

    /// Candidate locations for an artifact: the primary path, then the
    /// same path one directory up (sessions started from a subdirectory).
    pub fn candidates(primary: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![primary.to_path_buf()];
        if primary.is_relative() {
            candidates.push(Path::new("..").join(primary));
        }
        candidates
    }

    /// First existing candidate, or the primary path when none exists
    pub fn resolve(primary: &Path) -> PathBuf {
        Self::candidates(primary)
            .into_iter()
            .find(|p| p.exists())
            .unwrap_or_else(|| primary.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_names() {
        let paths = ArtifactPaths::new("data", "results");
        assert_eq!(paths.model(), PathBuf::from("results/final_model_smote_rf.json"));
        assert_eq!(paths.metrics(), PathBuf::from("results/final_metrics.json"));
        assert_eq!(paths.test_set(), PathBuf::from("results/test_dataset.csv"));
        assert_eq!(paths.clean_data(), PathBuf::from("data/secom_preprocessed.csv"));
    }

    #[test]
    fn test_candidates_include_parent() {
        let candidates = ArtifactPaths::candidates(Path::new("results/final_metrics.json"));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1], PathBuf::from("../results/final_metrics.json"));
    }

    #[test]
    fn test_absolute_path_has_single_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("model.json");
        assert_eq!(ArtifactPaths::candidates(&primary), vec![primary.clone()]);
        assert_eq!(ArtifactPaths::resolve(&primary), primary);
    }
}

//! Persisted quality model

use crate::error::{QcError, Result};
use crate::utils::write_atomic;
use super::RandomForest;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Importance of one sensor column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

/// A fitted forest plus the input contract it was trained under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityModel {
    pub forest: RandomForest,
    /// Feature columns, in training order
    pub feature_names: Vec<String>,
    pub n_features: usize,
    /// Per-feature medians of the training partition, before oversampling
    pub training_medians: Vec<f64>,
    pub trained_at: DateTime<Utc>,
}

impl QualityModel {
    pub fn new(forest: RandomForest, feature_names: Vec<String>, training_medians: Vec<f64>) -> Result<Self> {
        let n_features = feature_names.len();
        if forest.n_features() != n_features || training_medians.len() != n_features {
            return Err(QcError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!(
                    "forest={} medians={}",
                    forest.n_features(),
                    training_medians.len()
                ),
            });
        }

        Ok(Self {
            forest,
            feature_names,
            n_features,
            training_medians,
            trained_at: Utc::now(),
        })
    }

    /// Probability of the defect class per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.forest.positive_class_proba(x)
    }

    /// The forest's own label decision
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        self.forest.predict(x)
    }

    /// Up to `k` features, most important first
    pub fn top_features(&self, k: usize) -> Vec<FeatureImportance> {
        let Some(importances) = self.forest.feature_importances() else {
            return Vec::new();
        };

        let mut ranked: Vec<FeatureImportance> = self
            .feature_names
            .iter()
            .zip(importances.iter())
            .map(|(name, &importance)| FeatureImportance {
                name: name.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked.truncate(k);
        ranked
    }

    /// Write as JSON through a temporary sibling file
    pub fn save(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        let bytes = serde_json::to_vec(self)?;
        write_atomic(path, &bytes)?;
        debug!(
            path = %path.display(),
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Saved model"
        );
        Ok(())
    }

    /// Load a model written by `save`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QcError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        if !model.forest.is_fitted() {
            return Err(QcError::ModelNotFitted);
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn fitted() -> QualityModel {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0, 0, 1, 1];
        let mut forest = RandomForest::new_classifier(5).with_random_state(42);
        forest.fit(&x, &y).unwrap();
        QualityModel::new(
            forest,
            vec!["s0".to_string(), "s1".to_string()],
            vec![2.5, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_top_features() {
        let model = fitted();
        let top = model.top_features(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "s0");
        assert_eq!(model.top_features(10).len(), 2);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = fitted();
        model.save(&path).unwrap();

        let loaded = QualityModel::load(&path).unwrap();
        assert_eq!(loaded.feature_names, model.feature_names);
        assert_eq!(loaded.training_medians, vec![2.5, 0.0]);
        let x = array![[1.5, 0.0], [3.5, 0.0]];
        assert_eq!(loaded.predict_proba(&x).unwrap(), model.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_mismatched_names_rejected() {
        let model = fitted();
        assert!(QualityModel::new(model.forest, vec!["only".to_string()], vec![0.0]).is_err());
    }
}

//! Training configuration

use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use super::Criterion;

/// Configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Label column of the clean table
    pub target_column: String,

    /// Fraction of rows held out for evaluation
    pub test_size: f64,

    /// Seed shared by the split, the oversampler and the forest
    pub random_state: u64,

    /// Number of trees
    pub n_estimators: usize,

    /// Neighbours used to interpolate synthetic minority samples
    pub smote_k_neighbors: usize,

    /// Maximum tree depth
    pub max_depth: Option<usize>,

    /// Minimum samples required to split a node
    pub min_samples_split: usize,

    /// Minimum samples in a leaf
    pub min_samples_leaf: usize,

    /// Impurity criterion
    pub criterion: Criterion,

    /// Worker threads for the forest fit; rayon's global pool when `None`
    pub n_jobs: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_column: "Target".to_string(),
            test_size: 0.2,
            random_state: 42,
            n_estimators: 100,
            smote_k_neighbors: 5,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            n_jobs: None,
        }
    }
}

impl TrainingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the label column
    pub fn with_target_column(mut self, name: impl Into<String>) -> Self {
        self.target_column = name.into();
        self
    }

    /// Builder method to set the held-out fraction
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    /// Builder method to set the random seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Builder method to set the number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    /// Builder method to set the oversampler's neighbour count
    pub fn with_smote_k_neighbors(mut self, k: usize) -> Self {
        self.smote_k_neighbors = k;
        self
    }

    /// Builder method to set the maximum tree depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Builder method to set the worker thread count
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Reject values the trainer cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(QcError::InvalidParameter {
                name: "test_size".to_string(),
                value: self.test_size.to_string(),
                reason: "must be in (0, 1)".to_string(),
            });
        }
        if self.n_estimators == 0 {
            return Err(QcError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.smote_k_neighbors == 0 {
            return Err(QcError::InvalidParameter {
                name: "smote_k_neighbors".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.n_jobs == Some(0) {
            return Err(QcError::InvalidParameter {
                name: "n_jobs".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

//! Model training module
//!
//! Splits the clean table, rebalances the training partition with SMOTE,
//! fits a random forest and evaluates it on the untouched test partition:
//! - Decision trees and Random Forests
//! - Stratified train/test split
//! - Classification metrics and reference comparison
//! - Model persistence

mod config;
mod engine;
mod metrics;
mod model;
mod split;
pub mod decision_tree;
pub mod random_forest;

pub use config::TrainingConfig;
pub use engine::{Trainer, TrainingOutcome, TrainingSummary};
pub use metrics::{ClassificationMetrics, MetricsComparison};
pub use model::{FeatureImportance, QualityModel};
pub use split::{stratified_split, TrainTestSplit};
pub use decision_tree::{DecisionTree, TreeNode, Criterion};
pub use random_forest::{RandomForest, MaxFeatures};

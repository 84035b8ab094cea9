//! Training engine implementation

use crate::artifacts::ArtifactPaths;
use crate::error::{QcError, Result};
use crate::preprocessing::{ImputeStrategy, Imputer};
use crate::synthetic::{class_counts, Sampler, SMOTE};
use crate::utils::data_loader::{array2_to_frame, column_names, frame_to_array2, with_label_column, write_csv};
use crate::utils::{load_csv, run_with_threads, split_target};
use super::{stratified_split, ClassificationMetrics, MaxFeatures, QualityModel, RandomForest, TrainingConfig};
use ndarray::{Array1, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Class counts at each stage of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub n_rows: usize,
    pub n_features: usize,
    pub full_counts: BTreeMap<i64, usize>,
    /// Training partition before oversampling
    pub train_counts: BTreeMap<i64, usize>,
    /// Training partition after oversampling
    pub resampled_counts: BTreeMap<i64, usize>,
    pub test_counts: BTreeMap<i64, usize>,
    pub n_synthetic: usize,
    pub training_time_secs: f64,
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: QualityModel,
    /// Metrics on the untouched test partition
    pub metrics: ClassificationMetrics,
    /// Test partition: feature columns plus the label column
    pub test_frame: DataFrame,
    pub summary: TrainingSummary,
}

/// Fits and evaluates the quality model
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on an in-memory clean table (feature columns plus the label)
    pub fn train(&self, clean: &DataFrame) -> Result<TrainingOutcome> {
        self.config.validate()?;
        let start = Instant::now();
        let cfg = &self.config;

        let (features, y) = split_target(clean, &cfg.target_column)?;
        let feature_names = column_names(&features);
        if feature_names.is_empty() {
            return Err(QcError::DataError("clean table has no feature columns".to_string()));
        }
        if let Some(col) = features.get_columns().iter().find(|c| c.null_count() > 0) {
            return Err(QcError::DataError(format!(
                "feature column '{}' has {} missing values; run preprocessing first",
                col.name(),
                col.null_count()
            )));
        }
        let x = frame_to_array2(&features)?;
        if x.iter().any(|v| v.is_nan()) {
            return Err(QcError::DataError("feature matrix contains NaN".to_string()));
        }

        // 1. stratified split
        let split = stratified_split(&y, cfg.test_size, cfg.random_state)?;
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train: Array1<i64> = split.train_indices.iter().map(|&i| y[i]).collect();
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test: Array1<i64> = split.test_indices.iter().map(|&i| y[i]).collect();

        let mut imputer = Imputer::new(ImputeStrategy::Median);
        imputer.fit_array(&x_train);
        let training_medians: Vec<f64> = imputer
            .fill_values()
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();

        // 2. oversample the training partition only
        let mut smote = SMOTE::new()
            .with_k_neighbors(cfg.smote_k_neighbors)
            .with_seed(cfg.random_state);
        let resampled = smote.fit_resample(&x_train, &y_train)?;
        let n_synthetic: usize = resampled.n_synthetic.values().sum();

        info!(
            train_rows = x_train.nrows(),
            test_rows = x_test.nrows(),
            synthetic = n_synthetic,
            "Training partition rebalanced"
        );

        // 3. fit the forest
        let mut forest = RandomForest::new_classifier(cfg.n_estimators)
            .with_max_depth(cfg.max_depth)
            .with_min_samples_split(cfg.min_samples_split)
            .with_min_samples_leaf(cfg.min_samples_leaf)
            .with_max_features(MaxFeatures::Sqrt)
            .with_criterion(cfg.criterion)
            .with_random_state(cfg.random_state);
        run_with_threads(cfg.n_jobs, || forest.fit(&resampled.x, &resampled.y).map(|_| ()))??;

        // 4. evaluate on the untouched test partition
        let y_pred = forest.predict(&x_test)?;
        let metrics = ClassificationMetrics::compute(&y_test, &y_pred)?;

        let test_frame = with_label_column(
            &array2_to_frame(&x_test, &feature_names)?,
            &cfg.target_column,
            &y_test,
        )?;

        let summary = TrainingSummary {
            n_rows: x.nrows(),
            n_features: feature_names.len(),
            full_counts: class_counts(&y),
            train_counts: class_counts(&y_train),
            resampled_counts: class_counts(&resampled.y),
            test_counts: class_counts(&y_test),
            n_synthetic,
            training_time_secs: start.elapsed().as_secs_f64(),
        };

        let model = QualityModel::new(forest, feature_names, training_medians)?;

        info!(
            trees = cfg.n_estimators,
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            elapsed_secs = summary.training_time_secs,
            "Training complete"
        );

        Ok(TrainingOutcome {
            model,
            metrics,
            test_frame,
            summary,
        })
    }

    /// Train from the clean table at `clean_path` and persist the model,
    /// the metrics and the test partition. Nothing is written unless
    /// training succeeds.
    pub fn train_and_save(&self, clean_path: &Path, paths: &ArtifactPaths) -> Result<TrainingOutcome> {
        let clean = load_csv(clean_path)?;
        info!(
            path = %clean_path.display(),
            rows = clean.height(),
            cols = clean.width(),
            "Loaded clean table"
        );

        let mut outcome = self.train(&clean)?;

        outcome.model.save(&paths.model())?;
        outcome.metrics.save(&paths.metrics())?;
        write_csv(&mut outcome.test_frame, &paths.test_set())?;

        info!(
            model = %paths.model().display(),
            metrics = %paths.metrics().display(),
            test_set = %paths.test_set().display(),
            "Artifacts written"
        );
        Ok(outcome)
    }
}

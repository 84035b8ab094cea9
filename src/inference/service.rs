//! Quality-control inference service
//!
//! Built once per session and shared behind an `Arc`. Artifacts are read
//! at construction; afterwards the service is read-only. None of the
//! public prediction calls return an error: failures are logged and
//! reported as `None`, which callers must read as "unavailable".

use crate::artifacts::ArtifactPaths;
use crate::error::{QcError, Result};
use crate::preprocessing::{ImputeStrategy, Imputer};
use crate::training::{ClassificationMetrics, FeatureImportance, MetricsComparison, QualityModel};
use crate::utils::data_loader::{column_names, columns_to_array2, frame_to_array2};
use super::{BatchImputation, InferenceConfig};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Labels and defect probabilities for a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 = defective, 0 = conforming
    pub labels: Array1<i64>,
    /// Probability of the defect class
    pub probabilities: Array1<f64>,
    /// Threshold applied, `None` for the model's own decision
    pub threshold: Option<f64>,
}

impl Prediction {
    fn empty(threshold: Option<f64>) -> Self {
        Self {
            labels: Array1::zeros(0),
            probabilities: Array1::zeros(0),
            threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_defects(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Fraction of rows predicted defective, 0 for an empty batch
    pub fn defect_rate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.n_defects() as f64 / self.len() as f64
        }
    }
}

/// Verdict for one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Conforming,
    Defective,
}

/// One row of a batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub index: usize,
    pub status: UnitStatus,
    pub defect_probability: f64,
    /// Probability of the more likely class
    pub confidence: f64,
}

/// Per-unit verdicts with batch totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub units: Vec<UnitResult>,
    pub n_units: usize,
    pub n_defective: usize,
    pub n_conforming: usize,
    /// Percentage of units predicted conforming, 0 for an empty batch
    pub yield_pct: f64,
    pub threshold: Option<f64>,
}

impl BatchReport {
    fn from_prediction(prediction: &Prediction) -> Self {
        let units: Vec<UnitResult> = prediction
            .labels
            .iter()
            .zip(prediction.probabilities.iter())
            .enumerate()
            .map(|(index, (&label, &p))| UnitResult {
                index,
                status: if label == 1 { UnitStatus::Defective } else { UnitStatus::Conforming },
                defect_probability: p,
                confidence: if p > 0.5 { p } else { 1.0 - p },
            })
            .collect();

        let n_units = units.len();
        let n_defective = prediction.n_defects();
        let n_conforming = n_units - n_defective;
        let yield_pct = if n_units == 0 {
            0.0
        } else {
            100.0 * n_conforming as f64 / n_units as f64
        };

        Self {
            units,
            n_units,
            n_defective,
            n_conforming,
            yield_pct,
            threshold: prediction.threshold,
        }
    }
}

/// Prediction service over the persisted model and reference metrics
#[derive(Debug)]
pub struct QualityControlService {
    config: InferenceConfig,
    model: Option<QualityModel>,
    model_path: Option<PathBuf>,
    reference_metrics: Option<ClassificationMetrics>,
    metrics_path: Option<PathBuf>,
}

impl QualityControlService {
    /// Load artifacts from the configured locations (each tried as given,
    /// then one directory up). A missing or unreadable artifact leaves the
    /// service without it and is logged as a warning.
    pub fn new(config: InferenceConfig) -> Self {
        let (model, model_path) = load_artifact(&config.model_path, "model", QualityModel::load);
        let (reference_metrics, metrics_path) =
            load_artifact(&config.metrics_path, "reference metrics", ClassificationMetrics::load);

        if let Some(model) = &model {
            info!(
                features = model.n_features,
                trees = model.forest.n_trees(),
                trained_at = %model.trained_at,
                "Model loaded"
            );
        }

        Self {
            config,
            model,
            model_path,
            reference_metrics,
            metrics_path,
        }
    }

    /// Service over in-memory artifacts
    pub fn with_model(
        config: InferenceConfig,
        model: Option<QualityModel>,
        reference_metrics: Option<ClassificationMetrics>,
    ) -> Self {
        Self {
            config,
            model,
            model_path: None,
            reference_metrics,
            metrics_path: None,
        }
    }

    /// Service over the default artifact layout
    pub fn from_paths(paths: &ArtifactPaths) -> Self {
        Self::new(InferenceConfig::from_paths(paths))
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&QualityModel> {
        self.model.as_ref()
    }

    /// Where the model was loaded from
    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn reference_metrics(&self) -> Option<&ClassificationMetrics> {
        self.reference_metrics.as_ref()
    }

    /// Where the reference metrics were loaded from
    pub fn metrics_path(&self) -> Option<&Path> {
        self.metrics_path.as_deref()
    }

    /// Feature count the model was trained on, or the configured default
    pub fn expected_features(&self) -> usize {
        self.model
            .as_ref()
            .map(|m| m.n_features)
            .unwrap_or(self.config.expected_features)
    }

    /// Convert a feature table to a complete matrix.
    ///
    /// A batch naming every training feature is reordered to training
    /// order. Otherwise columns are taken by position and a column count
    /// different from `expected_features()` is only logged; the model call
    /// rejects the matrix afterwards. Missing cells are filled per the
    /// configured `BatchImputation`.
    pub fn prepare(&self, data: &DataFrame) -> Result<Array2<f64>> {
        let x = match self.model.as_ref() {
            Some(model) => self.select_features(model, data)?,
            None => {
                let expected = self.expected_features();
                if data.width() != expected {
                    warn!(
                        expected,
                        actual = data.width(),
                        "Feature count mismatch; proceeding anyway"
                    );
                }
                frame_to_array2(data)?
            }
        };
        let n_missing = x.iter().filter(|v| v.is_nan()).count();
        if n_missing == 0 {
            return Ok(x);
        }

        let training_medians = self
            .model
            .as_ref()
            .map(|m| m.training_medians.as_slice())
            .filter(|medians| medians.len() == x.ncols());

        let imputer = match (self.config.imputation, training_medians) {
            (BatchImputation::TrainingMedians, Some(medians)) => {
                Imputer::from_fill_values(ImputeStrategy::Median, medians)
            }
            (_, medians) => {
                let mut imputer = Imputer::new(ImputeStrategy::Median);
                imputer.fit_array(&x);
                match medians {
                    Some(medians) => imputer.with_fallback(medians),
                    None => imputer,
                }
            }
        };

        debug!(cells = n_missing, strategy = ?self.config.imputation, "Imputing missing values");
        imputer.transform_array(&x)
    }

    /// Columns in training order when the batch holds exactly the model
    /// features by name; otherwise the batch is taken positionally.
    fn select_features(&self, model: &QualityModel, data: &DataFrame) -> Result<Array2<f64>> {
        let present = column_names(data);
        let missing: Vec<&String> = model
            .feature_names
            .iter()
            .filter(|name| !present.contains(*name))
            .collect();

        if missing.is_empty() && present.len() == model.n_features {
            if present != model.feature_names {
                debug!(
                    batch_columns = present.len(),
                    "Batch columns reordered to training order"
                );
            }
            return columns_to_array2(data, &model.feature_names);
        }

        let expected = model.n_features;
        if data.width() != expected {
            warn!(
                expected,
                actual = data.width(),
                "Feature count mismatch; proceeding anyway"
            );
        }
        if !missing.is_empty() {
            let preview: Vec<&str> = missing.iter().take(5).map(|s| s.as_str()).collect();
            warn!(
                missing = missing.len(),
                first_missing = ?preview,
                "Batch lacks training feature names; scoring columns by position"
            );
        }
        frame_to_array2(data)
    }

    /// Predict labels and defect probabilities.
    ///
    /// `threshold` overrides the configured one; with neither, the model's
    /// own decision is used. Returns `None` without a model or when the
    /// batch cannot be scored.
    pub fn predict(&self, data: &DataFrame, threshold: Option<f64>) -> Option<Prediction> {
        let Some(model) = self.model.as_ref() else {
            warn!("Prediction requested but no model is loaded");
            return None;
        };
        let threshold = threshold.or(self.config.classification_threshold);

        let start = Instant::now();
        match self.score(model, data, threshold) {
            Ok(prediction) => {
                info!(
                    rows = prediction.len(),
                    defects = prediction.n_defects(),
                    defect_rate = prediction.defect_rate(),
                    ok = prediction.len() - prediction.n_defects(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Prediction summary"
                );
                Some(prediction)
            }
            Err(e) => {
                error!(error = %e, "Prediction failed");
                None
            }
        }
    }

    fn score(&self, model: &QualityModel, data: &DataFrame, threshold: Option<f64>) -> Result<Prediction> {
        if data.height() == 0 {
            return Ok(Prediction::empty(threshold));
        }

        let x = self.prepare(data)?;
        let probabilities = model.predict_proba(&x)?;
        let labels = match threshold {
            Some(t) => probabilities.mapv(|p| i64::from(p >= t)),
            None => model.predict(&x)?,
        };

        Ok(Prediction {
            labels,
            probabilities,
            threshold,
        })
    }

    /// Recompute the evaluation metrics on a labeled batch with the model's
    /// own decision rule and log them against the reference metrics
    pub fn evaluate_performance(&self, x: &DataFrame, y_true: &Array1<i64>) -> Option<ClassificationMetrics> {
        let Some(model) = self.model.as_ref() else {
            warn!("Evaluation requested but no model is loaded");
            return None;
        };

        let result = self
            .score(model, x, None)
            .and_then(|prediction| ClassificationMetrics::compute(y_true, &prediction.labels));

        let metrics = match result {
            Ok(metrics) => metrics,
            Err(e) => {
                error!(error = %e, "Evaluation failed");
                return None;
            }
        };

        let cm = metrics.confusion_matrix;
        info!(
            samples = metrics.n_samples(),
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            "Evaluation"
        );
        info!(
            true_ok_pred_ok = cm[0][0],
            true_ok_pred_defect = cm[0][1],
            true_defect_pred_ok = cm[1][0],
            true_defect_pred_defect = cm[1][1],
            "Confusion matrix"
        );
        if let Some(comparison) = self.compare_with_reference(&metrics) {
            for (name, reference, current, delta) in comparison.rows() {
                info!(metric = name, reference, current, delta, "Against reference");
            }
        }

        Some(metrics)
    }

    /// Side-by-side with the reference metrics, when they were loaded
    pub fn compare_with_reference(&self, current: &ClassificationMetrics) -> Option<MetricsComparison> {
        self.reference_metrics
            .map(|reference| MetricsComparison::new(reference, *current))
    }

    /// Score an uploaded batch. A label column, if present, is ignored.
    pub fn analyze(&self, data: &DataFrame, threshold: Option<f64>) -> Option<BatchReport> {
        let target = &self.config.target_column;
        let features = if column_names(data).iter().any(|n| n == target) {
            match data.drop(target) {
                Ok(df) => df,
                Err(e) => {
                    error!(error = %e, "Could not strip label column");
                    return None;
                }
            }
        } else {
            data.clone()
        };

        let prediction = self.predict(&features, threshold)?;
        Some(BatchReport::from_prediction(&prediction))
    }

    /// Top-k sensors by importance; empty without a model
    pub fn top_features(&self, k: usize) -> Vec<FeatureImportance> {
        self.model
            .as_ref()
            .map(|m| m.top_features(k))
            .unwrap_or_default()
    }
}

/// Load an artifact from the first candidate location that holds one
fn load_artifact<T>(
    primary: &Path,
    what: &str,
    load: impl Fn(&Path) -> Result<T>,
) -> (Option<T>, Option<PathBuf>) {
    for candidate in ArtifactPaths::candidates(primary) {
        match load(&candidate) {
            Ok(artifact) => {
                debug!(path = %candidate.display(), "Loaded {}", what);
                return (Some(artifact), Some(candidate));
            }
            Err(QcError::FileNotFound(_)) => continue,
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "Could not load {}", what);
                return (None, None);
            }
        }
    }

    warn!(path = %primary.display(), "No {} found; continuing without it", what);
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::RandomForest;
    use ndarray::array;

    fn config() -> InferenceConfig {
        InferenceConfig::from_paths(&ArtifactPaths::new("unused", "unused"))
    }

    fn model() -> QualityModel {
        let x = array![[0.0, 5.0], [1.0, 5.0], [2.0, 5.0], [10.0, 5.0], [11.0, 5.0], [12.0, 5.0]];
        let y = array![0, 0, 0, 1, 1, 1];
        let mut forest = RandomForest::new_classifier(10).with_random_state(42);
        forest.fit(&x, &y).unwrap();
        QualityModel::new(forest, vec!["a".to_string(), "b".to_string()], vec![1.5, 5.0]).unwrap()
    }

    fn service() -> QualityControlService {
        QualityControlService::with_model(config(), Some(model()), None)
    }

    #[test]
    fn test_missing_artifacts_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let service = QualityControlService::from_paths(&ArtifactPaths::new(
            dir.path().join("data"),
            dir.path().join("results"),
        ));
        assert!(!service.has_model());
        assert!(service.reference_metrics().is_none());
        assert_eq!(service.expected_features(), 567);

        let df = df!("a" => &[1.0]).unwrap();
        assert!(service.predict(&df, None).is_none());
        assert!(service.evaluate_performance(&df, &array![0]).is_none());
        assert!(service.analyze(&df, None).is_none());
    }

    #[test]
    fn test_corrupt_model_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("data"), dir.path().join("results"));
        std::fs::create_dir_all(&paths.results_dir).unwrap();
        std::fs::write(paths.model(), b"not json").unwrap();

        let service = QualityControlService::from_paths(&paths);
        assert!(!service.has_model());
    }

    #[test]
    fn test_predict_threshold() {
        let service = service();
        let df = df!("a" => &[0.5, 6.0, 11.5], "b" => &[5.0, 5.0, 5.0]).unwrap();

        let native = service.predict(&df, None).unwrap();
        assert_eq!(native.labels.to_vec(), vec![0, native.labels[1], 1]);

        for t in [0.0, 0.3, 0.5, 0.9, 1.0] {
            let p = service.predict(&df, Some(t)).unwrap();
            for (label, prob) in p.labels.iter().zip(p.probabilities.iter()) {
                assert_eq!(*label, i64::from(*prob >= t));
            }
        }
    }

    #[test]
    fn test_empty_batch() {
        let service = service();
        let df = df!("a" => Vec::<f64>::new(), "b" => Vec::<f64>::new()).unwrap();
        let p = service.predict(&df, None).unwrap();
        assert_eq!(p.len(), 0);
        assert_eq!(p.probabilities.len(), 0);

        let report = service.analyze(&df, None).unwrap();
        assert_eq!(report.n_units, 0);
        assert_eq!(report.yield_pct, 0.0);
    }

    #[test]
    fn test_shape_mismatch_yields_none() {
        let service = service();
        let df = df!("a" => &[1.0], "b" => &[2.0], "c" => &[3.0]).unwrap();
        assert!(service.prepare(&df).is_ok());
        assert!(service.predict(&df, None).is_none());
    }

    #[test]
    fn test_columns_scored_by_name() {
        let service = service();
        let in_order = df!("a" => &[11.0, 0.0], "b" => &[105.0, 105.0]).unwrap();
        let swapped = df!("b" => &[105.0, 105.0], "a" => &[11.0, 0.0]).unwrap();

        let expected = service.predict(&in_order, None).unwrap();
        let reordered = service.predict(&swapped, None).unwrap();
        assert_eq!(expected.labels.to_vec(), vec![1, 0]);
        assert_eq!(reordered, expected);
        assert_eq!(service.prepare(&swapped).unwrap(), service.prepare(&in_order).unwrap());
    }

    #[test]
    fn test_unnamed_columns_scored_by_position() {
        let service = service();
        let renamed = df!("x" => &[11.0, 0.0], "y" => &[5.0, 5.0]).unwrap();
        let prediction = service.predict(&renamed, None).unwrap();
        assert_eq!(prediction.labels.to_vec(), vec![1, 0]);
    }

    #[test]
    fn test_prepare_per_batch_medians() {
        let service = service();
        let df = df!(
            "a" => &[Some(1.0), None, Some(3.0)],
            "b" => &[None::<f64>, None, None]
        )
        .unwrap();
        let x = service.prepare(&df).unwrap();
        assert_eq!(x[[1, 0]], 2.0);
        // no batch median: training median
        assert_eq!(x[[0, 1]], 5.0);
    }

    #[test]
    fn test_prepare_training_medians() {
        let config = config().with_imputation(BatchImputation::TrainingMedians);
        let service = QualityControlService::with_model(config, Some(model()), None);
        let df = df!("a" => &[Some(1.0), None, Some(3.0)], "b" => &[1.0, 2.0, 3.0]).unwrap();
        let x = service.prepare(&df).unwrap();
        assert_eq!(x[[1, 0]], 1.5);
    }

    #[test]
    fn test_analyze_strips_target() {
        let service = service();
        let df = df!(
            "a" => &[0.0, 12.0],
            "b" => &[5.0, 5.0],
            "Target" => &[0i64, 1]
        )
        .unwrap();
        let report = service.analyze(&df, None).unwrap();

        assert_eq!(report.n_units, 2);
        assert_eq!(report.n_defective, 1);
        assert_eq!(report.yield_pct, 50.0);
        assert_eq!(report.units[1].status, UnitStatus::Defective);
        for unit in &report.units {
            assert!(unit.confidence >= 0.5 && unit.confidence <= 1.0);
        }
    }

    #[test]
    fn test_evaluate_against_reference() {
        let reference = ClassificationMetrics::from_confusion([[1, 0], [0, 1]]);
        let service = QualityControlService::with_model(config(), Some(model()), Some(reference));
        let df = df!("a" => &[0.0, 12.0], "b" => &[5.0, 5.0]).unwrap();

        let metrics = service.evaluate_performance(&df, &array![0, 1]).unwrap();
        assert_eq!(metrics, reference);
        let cmp = service.compare_with_reference(&metrics).unwrap();
        assert!(cmp.rows().iter().all(|row| row.3 == 0.0));

        // wrong label count is logged, not raised
        assert!(service.evaluate_performance(&df, &array![0]).is_none());
    }
}

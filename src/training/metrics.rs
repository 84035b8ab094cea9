//! Binary classification metrics with the defect class as positive

use crate::error::{QcError, Result};
use crate::utils::write_atomic;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Evaluation record persisted next to the model.
///
/// `confusion_matrix[t][p]` counts rows with true class `t` predicted as
/// `p`, in the order [OK, Defect].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: [[u64; 2]; 2],
}

impl ClassificationMetrics {
    /// Compare true and predicted {0, 1} labels
    pub fn compute(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(QcError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }

        let mut cm = [[0u64; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let (t, p) = (binary_index(t)?, binary_index(p)?);
            cm[t][p] += 1;
        }

        Ok(Self::from_confusion(cm))
    }

    /// Derive the scalar metrics from a confusion matrix. Undefined ratios
    /// (zero denominators) are reported as 0.
    pub fn from_confusion(cm: [[u64; 2]; 2]) -> Self {
        let tn = cm[0][0] as f64;
        let fp = cm[0][1] as f64;
        let fn_ = cm[1][0] as f64;
        let tp = cm[1][1] as f64;
        let total = tn + fp + fn_ + tp;

        let accuracy = ratio(tp + tn, total);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = ratio(2.0 * precision * recall, precision + recall);

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
            confusion_matrix: cm,
        }
    }

    /// Number of evaluated rows
    pub fn n_samples(&self) -> u64 {
        self.confusion_matrix.iter().flatten().sum()
    }

    /// Write as JSON through a temporary sibling file
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    /// Load a JSON metrics record
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QcError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The four scalar metrics as (name, value) pairs
    pub fn scalars(&self) -> [(&'static str, f64); 4] {
        [
            ("Accuracy", self.accuracy),
            ("Precision", self.precision),
            ("Recall", self.recall),
            ("F1-Score", self.f1_score),
        ]
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

fn binary_index(label: i64) -> Result<usize> {
    match label {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(QcError::ValidationError(format!(
            "expected a 0/1 label, got {}",
            other
        ))),
    }
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.scalars() {
            writeln!(f, "  {:<10} {:.4}", name, value)?;
        }
        let cm = &self.confusion_matrix;
        writeln!(f, "  {:<14} {:>8} {:>8}", "", "Pred OK", "Pred Def")?;
        writeln!(f, "  {:<14} {:>8} {:>8}", "True OK", cm[0][0], cm[0][1])?;
        write!(f, "  {:<14} {:>8} {:>8}", "True Defect", cm[1][0], cm[1][1])
    }
}

/// Current metrics side by side with the training-time reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsComparison {
    pub reference: ClassificationMetrics,
    pub current: ClassificationMetrics,
}

impl MetricsComparison {
    pub fn new(reference: ClassificationMetrics, current: ClassificationMetrics) -> Self {
        Self { reference, current }
    }

    /// (name, reference, current, current - reference) per scalar metric
    pub fn rows(&self) -> Vec<(&'static str, f64, f64, f64)> {
        self.reference
            .scalars()
            .iter()
            .zip(self.current.scalars().iter())
            .map(|(&(name, r), &(_, c))| (name, r, c, c - r))
            .collect()
    }
}

impl fmt::Display for MetricsComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {:<10} {:>10} {:>10} {:>10}", "Metric", "Reference", "Current", "Delta")?;
        let rows = self.rows();
        for (i, (name, r, c, d)) in rows.iter().enumerate() {
            write!(f, "  {:<10} {:>10.4} {:>10.4} {:>+10.4}", name, r, c, d)?;
            if i + 1 < rows.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

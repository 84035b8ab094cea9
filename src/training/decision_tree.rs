//! Decision tree classifier
//!
//! Nodes are stored in a flat arena (`Vec<TreeNode>`) and refer to their
//! children by index, so fitted trees serialize without nesting.

use crate::error::{QcError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the class distribution of its training samples
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node; samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity
    Gini,
    /// Entropy
    Entropy,
}

impl Criterion {
    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Best split found for a node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Sample-weighted impurity of the two children
    child_impurity: f64,
}

/// Pending node on the build stack
struct Pending {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Node arena, root at index 0
    nodes: Vec<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random per node; all features when `None`
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Sorted class labels; leaf values are indexed the same way
    classes: Vec<i64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            classes: Vec::new(),
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set number of features sampled per node
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(QcError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let mut classes: Vec<i64> = y.iter().copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let encoded = encode_labels(y, &classes)?;
        let samples: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        self.fit_samples(x, &encoded, &classes, samples, &mut rng)?;
        Ok(self)
    }

    /// Fit on a subset of rows (repeats allowed, as in a bootstrap draw).
    ///
    /// `y` holds class positions into `classes`; the forest encodes labels
    /// once so every tree shares the same class layout.
    pub(crate) fn fit_samples(
        &mut self,
        x: &Array2<f64>,
        y: &[usize],
        classes: &[i64],
        samples: Vec<usize>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        if samples.is_empty() {
            return Err(QcError::ValidationError(
                "Cannot fit a tree on zero samples".to_string(),
            ));
        }
        if classes.is_empty() {
            return Err(QcError::ValidationError("No classes to fit".to_string()));
        }

        let n_features = x.ncols();
        self.n_features = n_features;
        self.classes = classes.to_vec();
        self.nodes.clear();

        let n_classes = classes.len();
        let mut importances = vec![0.0; n_features];
        let mut feature_order: Vec<usize> = (0..n_features).collect();

        self.nodes.push(TreeNode::Leaf { value: Vec::new(), n_samples: 0 });
        let mut stack = vec![Pending { node: 0, samples, depth: 0 }];

        while let Some(Pending { node, samples, depth }) = stack.pop() {
            let counts = class_counts(&samples, y, n_classes);
            let n_samples = samples.len();
            let impurity = self.criterion.impurity(&counts, n_samples);

            let should_stop = n_samples < self.min_samples_split
                || n_samples < 2 * self.min_samples_leaf
                || self.max_depth.map_or(false, |d| depth >= d)
                || impurity <= f64::EPSILON;

            let split = if should_stop {
                None
            } else {
                feature_order.shuffle(rng);
                self.find_best_split(x, y, &samples, &feature_order, n_classes)
            };

            let Some(split) = split else {
                self.nodes[node] = leaf(&counts, n_samples);
                continue;
            };

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .partition(|&&i| x[[i, split.feature_idx]] <= split.threshold);

            importances[split.feature_idx] +=
                n_samples as f64 * impurity - split.child_impurity;

            let left = self.nodes.len();
            let right = left + 1;
            self.nodes.push(TreeNode::Leaf { value: Vec::new(), n_samples: 0 });
            self.nodes.push(TreeNode::Leaf { value: Vec::new(), n_samples: 0 });
            self.nodes[node] = TreeNode::Split {
                feature_idx: split.feature_idx,
                threshold: split.threshold,
                left,
                right,
                n_samples,
                impurity,
            };

            stack.push(Pending { node: right, samples: right_samples, depth: depth + 1 });
            stack.push(Pending { node: left, samples: left_samples, depth: depth + 1 });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(())
    }

    /// Scan features in `feature_order`. The first `max_features` are
    /// always tried; later ones only while no valid split has been found.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        samples: &[usize],
        feature_order: &[usize],
        n_classes: usize,
    ) -> Option<SplitCandidate> {
        let n_to_try = self.max_features.unwrap_or(feature_order.len()).min(feature_order.len());
        let mut best: Option<SplitCandidate> = None;
        let mut pairs: Vec<(f64, usize)> = Vec::with_capacity(samples.len());

        for (tried, &feature_idx) in feature_order.iter().enumerate() {
            if tried >= n_to_try && best.is_some() {
                break;
            }

            pairs.clear();
            pairs.extend(samples.iter().map(|&i| (x[[i, feature_idx]], y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            if let Some(candidate) = self.sweep_feature(feature_idx, &pairs, n_classes) {
                if best.map_or(true, |b| candidate.child_impurity < b.child_impurity) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Sweep sorted (value, class) pairs, moving one sample at a time from
    /// the right child to the left child.
    fn sweep_feature(
        &self,
        feature_idx: usize,
        pairs: &[(f64, usize)],
        n_classes: usize,
    ) -> Option<SplitCandidate> {
        let n = pairs.len();
        let mut left = vec![0usize; n_classes];
        let mut right = vec![0usize; n_classes];
        for &(_, class) in pairs {
            right[class] += 1;
        }

        let mut best: Option<SplitCandidate> = None;
        for pos in 0..n - 1 {
            let class = pairs[pos].1;
            left[class] += 1;
            right[class] -= 1;

            let (current, next) = (pairs[pos].0, pairs[pos + 1].0);
            if next <= current {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let child_impurity = n_left as f64 * self.criterion.impurity(&left, n_left)
                + n_right as f64 * self.criterion.impurity(&right, n_right);

            if best.map_or(true, |b| child_impurity < b.child_impurity) {
                let mut threshold = current + (next - current) / 2.0;
                // midpoint can round up to `next`
                if threshold >= next {
                    threshold = current;
                }
                best = Some(SplitCandidate { feature_idx, threshold, child_impurity });
            }
        }

        best
    }

    fn leaf_value(&self, sample: ArrayView1<f64>) -> Result<&[f64]> {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx).ok_or(QcError::ModelNotFitted)? {
                TreeNode::Leaf { value, .. } => return Ok(value),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    idx = if sample[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(QcError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(QcError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Class probabilities, one column per entry of `classes()`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(x)?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, sample) in x.rows().into_iter().enumerate() {
            for (j, &p) in self.leaf_value(sample)?.iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_labels(&proba, &self.classes))
    }

    /// Sorted class labels seen during fit
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth (a lone leaf has depth 0)
    pub fn get_depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(TreeNode::Split { left, right, .. }) = self.nodes.get(idx) {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Number of nodes in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn class_counts(samples: &[usize], y: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in samples {
        counts[y[i]] += 1;
    }
    counts
}

fn leaf(counts: &[usize], n_samples: usize) -> TreeNode {
    let n = n_samples.max(1) as f64;
    TreeNode::Leaf {
        value: counts.iter().map(|&c| c as f64 / n).collect(),
        n_samples,
    }
}

/// Map labels to their position in sorted `classes`
pub(crate) fn encode_labels(y: &Array1<i64>, classes: &[i64]) -> Result<Vec<usize>> {
    y.iter()
        .map(|label| {
            classes.binary_search(label).map_err(|_| {
                QcError::ValidationError(format!("Unknown class label {}", label))
            })
        })
        .collect()
}

/// Most probable class per row; ties go to the smaller label
pub(crate) fn argmax_labels(proba: &Array2<f64>, classes: &[i64]) -> Array1<i64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (j, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = j;
                }
            }
            classes.get(best).copied().unwrap_or(0)
        })
        .collect()
}

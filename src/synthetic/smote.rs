//! SMOTE (Synthetic Minority Over-sampling Technique)

use crate::error::{QcError, Result};
use crate::synthetic::{Sampler, ResampleResult, class_counts, class_indices};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool { self.0 == other.0 }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// SMOTE sampler.
///
/// Each synthetic sample lies on the segment between a random member of
/// the class and one of its `k` nearest same-class neighbours. Classes are
/// grown until they reach `sampling_strategy × majority count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Target ratio of each class to the majority class
    sampling_strategy: f64,
    /// Random seed
    seed: Option<u64>,
    /// Target samples per class
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    /// Create new SMOTE sampler that fully balances the classes
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set sampling strategy (ratio to the majority count)
    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio.clamp(0.1, 1.0);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Per-class target counts computed by `fit`
    pub fn target_counts(&self) -> Option<&BTreeMap<i64, usize>> {
        self.target_counts.as_ref()
    }

    /// Squared Euclidean distance
    fn distance_sq(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum()
    }

    /// k nearest same-class neighbours of every member, as positions in `members`.
    /// BinaryHeap keeps this O(n log k) per member.
    fn neighbor_table(x: &Array2<f64>, members: &[usize], k: usize) -> Vec<Vec<usize>> {
        members
            .par_iter()
            .enumerate()
            .map(|(pos, &row)| {
                let point = x.row(row);
                let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
                for (other_pos, &other_row) in members.iter().enumerate() {
                    if other_pos == pos {
                        continue;
                    }
                    let dist = Self::distance_sq(point, x.row(other_row));
                    if heap.len() < k {
                        heap.push(DistIdx(dist, other_pos));
                    } else if let Some(&DistIdx(max_dist, _)) = heap.peek() {
                        if dist < max_dist {
                            heap.pop();
                            heap.push(DistIdx(dist, other_pos));
                        }
                    }
                }
                heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
            })
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(QcError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(QcError::ValidationError(
                "Need at least 2 classes for SMOTE".to_string()
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        let targets = counts
            .iter()
            .map(|(&class, &count)| {
                let target = (max_count as f64 * self.sampling_strategy).round() as usize;
                (class, target.max(count))
            })
            .collect();

        self.target_counts = Some(targets);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or_else(|| {
            QcError::ValidationError("SMOTE not fitted".to_string())
        })?;

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic_x: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        for (&class, &target_count) in targets {
            let members = match indices.get(&class) {
                Some(m) if !m.is_empty() => m,
                _ => continue,
            };
            let n_to_generate = target_count.saturating_sub(members.len());
            n_synthetic.insert(class, n_to_generate);
            if n_to_generate == 0 {
                continue;
            }

            // a lone member has no neighbour to interpolate towards
            let k = self.k_neighbors.min(members.len() - 1);
            let neighbors = if k > 0 {
                Self::neighbor_table(x, members, k)
            } else {
                vec![Vec::new(); members.len()]
            };

            for _ in 0..n_to_generate {
                let pos = rng.gen_range(0..members.len());
                let sample = x.row(members[pos]);

                match neighbors[pos].choose(&mut rng) {
                    Some(&npos) => {
                        let neighbor = x.row(members[npos]);
                        let gap: f64 = rng.gen();
                        synthetic_x.extend(
                            sample.iter().zip(neighbor.iter()).map(|(&p, &n)| p + gap * (n - p)),
                        );
                    }
                    None => synthetic_x.extend(sample.iter().copied()),
                }
                synthetic_y.push(class);
            }
        }

        let n_original = x.nrows();
        let n_new = synthetic_y.len();
        let extra = Array2::from_shape_vec((n_new, n_features), synthetic_x)?;
        let result_x = ndarray::concatenate(ndarray::Axis(0), &[x.view(), extra.view()])?;

        let mut all_y: Vec<i64> = Vec::with_capacity(n_original + n_new);
        all_y.extend(y.iter().copied());
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        // 20 majority around the origin, 5 minority around (10, 10)
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0i64);
        }

        for i in 0..5 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1i64);
        }

        let x = Array2::from_shape_vec((25, 2), data).unwrap();
        let y = Array1::from_vec(labels);

        (x, y)
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new()
            .with_k_neighbors(3)
            .with_seed(42);

        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 20);
        assert_eq!(counts[&1], 20);
        assert_eq!(result.n_synthetic[&1], 15);
        assert_eq!(result.n_synthetic[&0], 0);
        assert_eq!(result.x.nrows(), 40);
    }

    #[test]
    fn test_smote_preserves_original() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            assert_eq!(result.x.row(i), x.row(i));
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_synthetic_samples_stay_in_minority_hull() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new().with_k_neighbors(4).with_seed(7);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in x.nrows()..result.x.nrows() {
            let row = result.x.row(i);
            assert!(row[0] >= 10.0 && row[0] <= 12.0, "x out of range: {}", row[0]);
            assert!(row[1] >= 10.0 && row[1] <= 11.0, "y out of range: {}", row[1]);
        }
    }

    #[test]
    fn test_smote_is_deterministic_with_seed() {
        let (x, y) = create_imbalanced_data();

        let a = SMOTE::new().with_seed(42).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_seed(42).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_single_minority_sample_is_duplicated() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 9.0]).unwrap();
        let y = Array1::from_vec(vec![0, 0, 0, 1]);

        let result = SMOTE::new().with_seed(1).fit_resample(&x, &y).unwrap();
        assert_eq!(result.x.nrows(), 6);
        assert_eq!(result.x[[4, 0]], 9.0);
        assert_eq!(result.x[[5, 0]], 9.0);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((3, 2));
        let y = Array1::from_vec(vec![1, 1, 1]);
        assert!(SMOTE::new().fit_resample(&x, &y).is_err());
    }

    #[test]
    fn test_resample_before_fit() {
        let (x, y) = create_imbalanced_data();
        assert!(SMOTE::new().resample(&x, &y).is_err());
    }
}

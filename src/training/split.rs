//! Stratified train/test partitioning

use crate::error::{QcError, Result};
use crate::synthetic::class_indices;
use ndarray::Array1;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Row indices of the two partitions, each in ascending order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Split rows so that both partitions keep the label proportions.
///
/// The test partition holds `ceil(test_size * n)` rows. Its per-class
/// counts are the class shares of that size, rounded by largest remainder
/// (ties to the smaller label), so each class is off by less than one row
/// from its exact share.
pub fn stratified_split(y: &Array1<i64>, test_size: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(QcError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let n = y.len();
    let classes = class_indices(y);
    if let Some((label, members)) = classes.iter().find(|(_, m)| m.len() < 2) {
        return Err(QcError::ValidationError(format!(
            "class {} has {} member(s); stratified splitting needs at least 2",
            label,
            members.len()
        )));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n - n_test;
    if n_test < classes.len() || n_train < classes.len() {
        return Err(QcError::ValidationError(format!(
            "{} rows cannot be split into train={} / test={} with {} classes",
            n, n_train, n_test, classes.len()
        )));
    }

    let test_counts = allocate(&classes.values().map(Vec::len).collect::<Vec<_>>(), n_test);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::with_capacity(n_train);
    let mut test_indices = Vec::with_capacity(n_test);

    for (members, &n_class_test) in classes.values().zip(test_counts.iter()) {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        let (test, train) = shuffled.split_at(n_class_test);
        test_indices.extend_from_slice(test);
        train_indices.extend_from_slice(train);
    }

    train_indices.sort_unstable();
    test_indices.sort_unstable();

    Ok(TrainTestSplit { train_indices, test_indices })
}

/// Distribute `total` rows over classes proportionally to `counts`
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| total as f64 * c as f64 / n as f64)
        .collect();

    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = total.saturating_sub(alloc.iter().sum());

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    for &idx in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if alloc[idx] < counts[idx] {
            alloc[idx] += 1;
            remaining -= 1;
        }
    }

    alloc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n_ok: usize, n_defect: usize) -> Array1<i64> {
        let mut y = vec![0i64; n_ok];
        y.extend(std::iter::repeat(1).take(n_defect));
        Array1::from_vec(y)
    }

    #[test]
    fn test_split_sizes_and_ratio() {
        // SECOM class balance: 1463 conforming, 104 defective
        let y = labels(1463, 104);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        assert_eq!(split.test_indices.len(), 314);
        assert_eq!(split.train_indices.len(), 1253);

        let test_defects = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
        let exact = 314.0 * 104.0 / 1567.0;
        assert!((test_defects as f64 - exact).abs() < 1.0);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let y = labels(30, 10);
        let split = stratified_split(&y, 0.25, 1).unwrap();

        let mut all: Vec<usize> = split.train_indices.clone();
        all.extend(&split.test_indices);
        all.sort_unstable();
        assert_eq!(all, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        let y = labels(50, 12);
        assert_eq!(
            stratified_split(&y, 0.2, 42).unwrap(),
            stratified_split(&y, 0.2, 42).unwrap()
        );
        assert_ne!(
            stratified_split(&y, 0.2, 42).unwrap(),
            stratified_split(&y, 0.2, 43).unwrap()
        );
    }

    #[test]
    fn test_singleton_class_rejected() {
        let y = labels(10, 1);
        assert!(matches!(
            stratified_split(&y, 0.2, 42),
            Err(QcError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_test_size() {
        let y = labels(10, 10);
        assert!(stratified_split(&y, 0.0, 42).is_err());
        assert!(stratified_split(&y, 1.5, 42).is_err());
    }

    #[test]
    fn test_allocate_largest_remainder() {
        assert_eq!(allocate(&[1463, 104], 314), vec![293, 21]);
        assert_eq!(allocate(&[5, 5], 3), vec![2, 1]);
    }
}

//! Integration test: Training pipeline end-to-end

use secom_qc::artifacts::ArtifactPaths;
use secom_qc::training::{ClassificationMetrics, QualityModel, Trainer, TrainingConfig};
use secom_qc::utils::{load_csv, split_target, write_csv};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Clean table with `n_sensors` columns where sensors 0 and 1 separate the classes
fn clean_df(n_ok: usize, n_defect: usize, n_sensors: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = n_ok + n_defect;
    let target: Vec<i64> = (0..n).map(|i| i64::from(i >= n_ok)).collect();

    let mut columns: Vec<Column> = (0..n_sensors)
        .map(|s| {
            let values: Vec<f64> = target
                .iter()
                .map(|&t| {
                    let shift = if s < 2 && t == 1 { 4.0 } else { 0.0 };
                    shift + rng.gen::<f64>()
                })
                .collect();
            Column::new(format!("{}", s).into(), values)
        })
        .collect();
    columns.push(Column::new("Target".into(), target));
    DataFrame::new(columns).unwrap()
}

#[test]
fn test_train_separable_data() {
    let trainer = Trainer::new(TrainingConfig::new().with_n_estimators(20));
    let outcome = trainer.train(&clean_df(100, 20, 6, 7)).unwrap();

    let s = &outcome.summary;
    assert_eq!(s.n_rows, 120);
    assert_eq!(s.n_features, 6);
    assert_eq!(s.test_counts[&0], 20);
    assert_eq!(s.test_counts[&1], 4);
    assert_eq!(s.train_counts[&1], 16);
    assert_eq!(s.resampled_counts[&1], 80);
    assert_eq!(s.n_synthetic, 64);

    assert_eq!(outcome.metrics.n_samples(), 24);
    assert!(outcome.metrics.recall > 0.99);
    assert!(outcome.metrics.accuracy > 0.95);

    // the informative sensors carry the importance
    let top = outcome.model.top_features(2);
    let mut names: Vec<&str> = top.iter().map(|f| f.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["0", "1"]);
}

#[test]
fn test_same_seed_same_model() {
    let df = clean_df(60, 15, 4, 3);
    let config = TrainingConfig::new().with_n_estimators(8).with_random_state(11);

    let a = Trainer::new(config.clone()).train(&df).unwrap();
    let b = Trainer::new(config).train(&df).unwrap();

    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.model.forest.feature_importances(), b.model.forest.feature_importances());
    assert!(a.test_frame.equals(&b.test_frame));
}

#[test]
fn test_single_class_rejected() {
    let df = clean_df(30, 0, 3, 1);
    assert!(Trainer::default().train(&df).is_err());
}

#[test]
fn test_missing_target_column() {
    let df = clean_df(30, 10, 3, 1).drop("Target").unwrap();
    assert!(Trainer::default().train(&df).is_err());
}

#[test]
fn test_invalid_config_rejected() {
    let config = TrainingConfig::new().with_test_size(1.5);
    assert!(Trainer::new(config).train(&clean_df(30, 10, 3, 1)).is_err());
}

#[test]
fn test_train_and_save_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::new(dir.path().join("data"), dir.path().join("results"));

    let mut clean = clean_df(80, 20, 5, 21);
    write_csv(&mut clean, &paths.clean_data()).unwrap();

    let trainer = Trainer::new(TrainingConfig::new().with_n_estimators(10));
    let outcome = trainer.train_and_save(&paths.clean_data(), &paths).unwrap();

    let model = QualityModel::load(&paths.model()).unwrap();
    assert_eq!(model.n_features, 5);
    assert_eq!(model.feature_names, outcome.model.feature_names);

    let metrics = ClassificationMetrics::load(&paths.metrics()).unwrap();
    assert_eq!(metrics, outcome.metrics);

    // the persisted partition reproduces the persisted metrics
    let test_df = load_csv(&paths.test_set()).unwrap();
    assert_eq!(test_df.height(), 20);
    let (features, y) = split_target(&test_df, "Target").unwrap();
    let x = secom_qc::utils::data_loader::frame_to_array2(&features).unwrap();
    let recomputed = ClassificationMetrics::compute(&y, &model.predict(&x).unwrap()).unwrap();
    assert_eq!(recomputed, metrics);
}

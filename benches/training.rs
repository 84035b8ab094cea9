use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use secom_qc::synthetic::{Sampler, SMOTE};
use secom_qc::training::RandomForest;

/// Imbalanced sensor matrix, roughly 1 defect in 14 like the production data
fn create_sensor_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<i64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let y: Array1<i64> = (0..n_rows).map(|i| i64::from(i % 14 == 0)).collect();
    let x = Array2::from_shape_fn((n_rows, n_features), |(i, j)| {
        let shift = if j < 3 && y[i] == 1 { 1.5 } else { 0.0 };
        shift + rng.gen::<f64>()
    });
    (x, y)
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    for n_features in [50, 200, 567].iter() {
        let (x, y) = create_sensor_data(1253, *n_features);

        group.bench_with_input(
            BenchmarkId::new("smote", n_features),
            &(x.clone(), y.clone()),
            |b, (x, y)| {
                b.iter(|| {
                    let mut smote = SMOTE::new().with_seed(42);
                    smote.fit_resample(black_box(x), black_box(y)).unwrap()
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("forest_fit", n_features),
            &(x, y),
            |b, (x, y)| {
                b.iter(|| {
                    let mut rf = RandomForest::new_classifier(50).with_random_state(42);
                    rf.fit(black_box(x), black_box(y)).unwrap();
                    rf
                })
            },
        );
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    // Train model once
    let (x, y) = create_sensor_data(1253, 567);
    let mut rf = RandomForest::new_classifier(100).with_random_state(42);
    rf.fit(&x, &y).unwrap();

    for n_rows in [1, 100, 1000].iter() {
        let (batch, _) = create_sensor_data(*n_rows, 567);

        group.bench_with_input(
            BenchmarkId::new("positive_class_proba", n_rows),
            &batch,
            |b, batch| {
                b.iter(|| rf.positive_class_proba(black_box(batch)).unwrap())
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);

//! Benchmarks for MAP fitting and Gibbs sampling
//!
//! Run with: cargo bench

use bpmf_model::{BayesianFactorizationModel, FactorizationModel, ModelConfig, Rating};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Roughly `density` of an `n × n` grid rated with values in `[1, 5]`.
fn synthetic_ratings(n: usize, density: f64, rng: &mut StdRng) -> Vec<Rating> {
    let mut ratings = vec![Rating::new(n - 1, n - 1, 3.0)];
    for row in 0..n {
        for col in 0..n {
            if (row, col) != (n - 1, n - 1) && rng.gen::<f64>() < density {
                ratings.push(Rating::new(row, col, rng.gen_range(1.0..=5.0)));
            }
        }
    }
    ratings
}

fn benchmark_map_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_fit");

    for &n in &[10, 30] {
        let mut rng = StdRng::seed_from_u64(1);
        let ratings = synthetic_ratings(n, 0.3, &mut rng);
        let model = FactorizationModel::new(ratings, 3, ModelConfig::default(), &mut rng).unwrap();

        group.bench_with_input(BenchmarkId::new("fit", n), &n, |b, _| {
            b.iter(|| {
                let mut model = model.clone();
                black_box(model.fit())
            });
        });
    }

    group.finish();
}

fn benchmark_gibbs_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("gibbs_step");

    for &(n, d) in &[(10, 2), (30, 5), (60, 10)] {
        let mut rng = StdRng::seed_from_u64(2);
        let ratings = synthetic_ratings(n, 0.2, &mut rng);
        let mut model =
            BayesianFactorizationModel::new(ratings, d, ModelConfig::default(), &mut rng).unwrap();

        group.bench_with_input(BenchmarkId::new(format!("d{}", d), n), &n, |b, _| {
            b.iter(|| black_box(model.gibbs_step(&mut rng).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_map_fit, benchmark_gibbs_step);
criterion_main!(benches);

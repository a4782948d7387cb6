//! Performance benchmarks for the allocation pipeline.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use regime_allocator::data::ReturnMatrix;
use regime_allocator::engine::{AllocationEngine, EngineConfig};
use regime_allocator::optimizer::{OptimizerConfig, RiskRatioOptimizer};
use regime_allocator::regime::RegimeClassifier;
use regime_allocator::types::{EconomicObservation, RatioMethod, RegimeLabel, YearMonth};
use regime_allocator::universe::SubMatrix;

fn months(count: usize) -> Vec<YearMonth> {
    let mut out = Vec::with_capacity(count);
    let mut date = YearMonth::new(1990, 1).unwrap();
    for _ in 0..count {
        out.push(date);
        date = date.succ();
    }
    out
}

/// Deterministic return column for asset `a`.
fn column(a: usize, n_dates: usize) -> Vec<f64> {
    (0..n_dates)
        .map(|i| {
            let t = i as f64;
            let phase = a as f64 * 0.9;
            0.003 + 0.0005 * a as f64 + 0.02 * (t * 0.7 + phase).sin() + 0.01 * (t * 0.23 + phase).cos()
        })
        .collect()
}

fn generate_sub_matrix(n_assets: usize, n_dates: usize) -> SubMatrix {
    let names = (0..n_assets).map(|a| format!("ASSET{:02}", a)).collect();
    let columns = (0..n_assets).map(|a| column(a, n_dates)).collect();
    SubMatrix::from_columns(names, columns).unwrap()
}

fn generate_economic(count: usize) -> Vec<EconomicObservation> {
    months(count)
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let t = i as f64;
            EconomicObservation::new(d, 2.0 + 2.5 * (t * 0.3).sin(), 2.5 + (t * 0.17).cos())
        })
        .collect()
}

fn generate_returns(n_assets: usize, count: usize) -> ReturnMatrix {
    let names = (0..n_assets).map(|a| format!("ASSET{:02}", a)).collect();
    let values = (0..n_assets)
        .map(|a| column(a, count).into_iter().map(Some).collect())
        .collect();
    ReturnMatrix::new(months(count), names, values).unwrap()
}

/// Benchmark single-regime optimization.
fn bench_optimizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer");

    for n_assets in [4, 8, 12].iter() {
        let sub = generate_sub_matrix(*n_assets, 60);
        let optimizer = RiskRatioOptimizer::new(OptimizerConfig {
            max_weight: 0.4,
            restarts: 4,
            rng_seed: Some(42),
            ..Default::default()
        })
        .unwrap();

        for method in RatioMethod::ALL {
            group.bench_with_input(
                BenchmarkId::new(method.to_string(), n_assets),
                &sub,
                |b, sub| {
                    b.iter(|| {
                        optimizer.optimize(
                            RegimeLabel::RisingGrowthFallingInflation,
                            black_box(sub),
                            method,
                        )
                    })
                },
            );
        }
    }

    group.finish();
}

/// Benchmark regime classification.
fn bench_classifier(c: &mut Criterion) {
    let economic = generate_economic(600);
    let classifier = RegimeClassifier::default();
    c.bench_function("classify_600_months", |b| {
        b.iter(|| classifier.classify(black_box(&economic)))
    });
}

/// Benchmark a full engine run.
fn bench_engine(c: &mut Criterion) {
    let economic = generate_economic(240);
    let returns = generate_returns(8, 240);
    let mut config = EngineConfig::default();
    config.optimizer.restarts = 2;
    config.optimizer.rng_seed = Some(7);
    let engine = AllocationEngine::new(config).unwrap();

    c.bench_function("engine_240_months_8_assets", |b| {
        b.iter(|| engine.run(black_box(&economic), black_box(&returns)))
    });
}

criterion_group!(benches, bench_optimizer, bench_classifier, bench_engine);
criterion_main!(benches);

//! Benchmarks for aggregation and grid enumeration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use trainflow::aggregate::aggregate;
use trainflow::trainer::{FoldResult, ParamAssignment, ParamGrid};

fn fold_results(n: usize) -> Vec<FoldResult> {
    (0..n)
        .map(|i| FoldResult {
            fold_index: i,
            accuracy: (i % 97) as f64 / 100.0,
            params: ParamAssignment::from([("c".to_string(), i as f64)]),
            elapsed: Duration::from_millis(5),
        })
        .collect()
}

fn aggregate_benchmark(c: &mut Criterion) {
    let results = fold_results(1000);
    c.bench_function("aggregate_1000_folds", |b| {
        b.iter(|| aggregate(black_box(&results)))
    });

    let grid = ParamGrid::new()
        .axis("c", vec![0.01, 0.1, 1.0, 10.0, 100.0])
        .axis("gamma", vec![1e-4, 1e-3, 1e-2, 1e-1, 1.0]);
    c.bench_function("grid_combinations_5x5", |b| {
        b.iter(|| black_box(&grid).combinations())
    });
}

criterion_group!(benches, aggregate_benchmark);
criterion_main!(benches);

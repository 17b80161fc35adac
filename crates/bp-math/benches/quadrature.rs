//! Criterion benchmarks for `bp-math`.
//!
//! Focus on the integrator, which dominates mixture fitting.

use bp_math::{qags, QuadratureOptions};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_qags(c: &mut Criterion) {
    let mut group = c.benchmark_group("qags");

    for (name, sigma) in [("broad", 1.0), ("narrow", 1e-2), ("spike", 1e-4)] {
        group.bench_with_input(BenchmarkId::new("gaussian", name), &sigma, |b, &s| {
            let opts = QuadratureOptions::with_tolerance(1e-6, 100);
            b.iter(|| {
                let pdf = |x: f64| (-0.5 * (x / s).powi(2)).exp();
                black_box(qags(pdf, black_box(-3.0), black_box(5.0), &opts).ok());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_qags);
criterion_main!(benches);

//! Criterion benchmarks for `calib-math`.
//!
//! Focus on the kernels that run once per sample point per analyzer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use calib_math::{beta_binomial, dirichlet_multinomial, dirichlet_multinomial_flat, gamma_poisson};

fn counts(n: usize, scale: f64) -> Vec<f64> {
    (0..n).map(|i| ((i * 7 + 3) % 11) as f64 * scale).collect()
}

fn bench_count_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("count");

    // Age-binned reference tables range from a handful to a few dozen bins.
    for bins in [4usize, 16, 64] {
        let ref_trials = counts(bins, 40.0);
        let sim_trials = counts(bins, 38.0);
        let ref_counts = counts(bins, 4.0);
        let sim_counts = counts(bins, 3.5);

        group.bench_with_input(BenchmarkId::new("gamma_poisson", bins), &bins, |b, _| {
            b.iter(|| {
                black_box(gamma_poisson(
                    black_box(&ref_trials),
                    black_box(&sim_trials),
                    black_box(&ref_counts),
                    black_box(&sim_counts),
                ));
            });
        });

        group.bench_with_input(BenchmarkId::new("beta_binomial", bins), &bins, |b, _| {
            b.iter(|| {
                black_box(beta_binomial(
                    black_box(&ref_trials),
                    black_box(&sim_trials),
                    black_box(&ref_counts),
                    black_box(&sim_counts),
                ));
            });
        });
    }

    group.finish();
}

fn bench_dirichlet(c: &mut Criterion) {
    let mut group = c.benchmark_group("dirichlet");

    for (bins, cats) in [(3usize, 4usize), (12, 8)] {
        let reference: Vec<Vec<f64>> = (0..bins).map(|_| counts(cats, 5.0)).collect();
        let sim: Vec<Vec<f64>> = (0..bins).map(|_| counts(cats, 4.0)).collect();

        let groups: Vec<usize> = (0..bins * cats).map(|i| i / cats).collect();
        let categories: Vec<usize> = (0..bins * cats).map(|i| i % cats).collect();
        let ref_flat: Vec<f64> = reference.iter().flatten().copied().collect();
        let sim_flat: Vec<f64> = sim.iter().flatten().copied().collect();

        let label = format!("{bins}x{cats}");
        group.bench_with_input(BenchmarkId::new("grid", &label), &label, |b, _| {
            b.iter(|| black_box(dirichlet_multinomial(black_box(&reference), black_box(&sim))));
        });
        group.bench_with_input(BenchmarkId::new("flat", &label), &label, |b, _| {
            b.iter(|| {
                black_box(dirichlet_multinomial_flat(
                    black_box(&groups),
                    black_box(&categories),
                    black_box(&ref_flat),
                    black_box(&sim_flat),
                ))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_count_kernels, bench_dirichlet);
criterion_main!(benches);

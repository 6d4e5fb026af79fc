//! Criterion benchmarks for adjoint_core recording and sweeping.
//!
//! Measures arena allocation, forward recording with a reverse sweep, and
//! nested episode turnaround across different tape sizes.

use adjoint_core::arena::Arena;
use adjoint_core::{nested, recover_memory, sum, Var};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Benchmark raw arena bump allocation and release.
fn bench_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena");

    for size in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("alloc_release", size), &size, |b, &n| {
            let mut arena: Arena<[f64; 4]> = Arena::default();
            b.iter(|| {
                let mark = arena.mark();
                for i in 0..n {
                    black_box(arena.alloc([i as f64; 4]));
                }
                arena.release(mark);
            });
        });
    }

    group.finish();
}

/// Benchmark recording a polynomial chain and sweeping it.
fn bench_record_and_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_and_sweep");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("horner", size), &size, |b, &n| {
            b.iter(|| {
                let x = Var::new(black_box(0.99));
                let mut acc = Var::new(1.0);
                for k in 0..n {
                    acc = acc * x + k as f64;
                }
                acc.grad().unwrap();
                let g = x.adjoint();
                recover_memory().unwrap();
                g
            });
        });

        group.bench_with_input(BenchmarkId::new("sum_reduction", size), &size, |b, &n| {
            b.iter(|| {
                let xs: Vec<Var> = (0..n).map(|i| Var::new(i as f64 * 1e-3)).collect();
                let terms: Vec<Var> = xs.iter().map(|x| x.exp()).collect();
                let total = sum(&terms);
                total.grad().unwrap();
                let g = xs[n - 1].adjoint();
                recover_memory().unwrap();
                g
            });
        });
    }

    group.finish();
}

/// Benchmark repeated nested episodes on a live outer tape.
fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested");

    for inner in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("episode", inner), &inner, |b, &n| {
            let outer = Var::new(0.5);
            b.iter(|| {
                nested(|| {
                    let t = Var::new(outer.value());
                    let mut acc = t;
                    for _ in 0..n {
                        acc = (acc * t).sin();
                    }
                    acc.grad().unwrap();
                    t.adjoint()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_arena, bench_record_and_sweep, bench_nested);
criterion_main!(benches);

//! Worker isolation: every thread differentiates on its own context.

use adjoint_core::{configure, context_stats, AdError, ContextConfig, Var};
use rayon::prelude::*;
use std::sync::Once;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// f(x) = Σ sin(i x) for i = 1..=n, f'(x) = Σ i cos(i x).
fn sweep_on_worker(x: f64, n: usize) -> (f64, usize) {
    let v = Var::new(x);
    let terms: Vec<Var> = (1..=n).map(|i| (v * i as f64).sin()).collect();
    let f = adjoint_core::sum(&terms);
    f.grad().unwrap();
    (v.adjoint(), context_stats().tape_len)
}

#[test]
fn test_parallel_workers_do_not_interfere() {
    init_tracing();
    let points: Vec<f64> = (0..64).map(|i| 0.05 * i as f64).collect();
    let results: Vec<f64> = points
        .par_iter()
        .map(|&x| {
            let (grad, _) = sweep_on_worker(x, 10);
            adjoint_core::recover_memory().unwrap();
            grad
        })
        .collect();

    for (x, grad) in points.iter().zip(&results) {
        let expected: f64 = (1..=10).map(|i| i as f64 * (i as f64 * x).cos()).sum();
        assert!((grad - expected).abs() < 1e-12, "x = {}: {} vs {}", x, grad, expected);
    }
}

#[test]
fn test_threads_have_independent_tapes() {
    init_tracing();
    let handles: Vec<_> = (1..=4)
        .map(|n| std::thread::spawn(move || sweep_on_worker(1.0, n * 5)))
        .collect();
    for (n, handle) in (1..=4).zip(handles) {
        let (_, tape_len) = handle.join().unwrap();
        // leaf, then a product and a sine per term, then the sum
        assert_eq!(tape_len, 1 + 2 * n * 5 + 1);
    }
}

#[test]
fn test_configure_is_per_thread() {
    init_tracing();
    std::thread::spawn(|| {
        let config = ContextConfig::builder()
            .block_bytes(4096)
            .max_bytes(1 << 20)
            .build()
            .unwrap();
        configure(config).unwrap();
        let _ = Var::new(1.0);
        assert!(matches!(
            configure(ContextConfig::default()),
            Err(AdError::ContextInUse { tape_len: 1 })
        ));
        adjoint_core::with_context(|ctx| assert_eq!(ctx.config().block_bytes(), 4096));
    })
    .join()
    .unwrap();

    std::thread::spawn(|| {
        adjoint_core::with_context(|ctx| assert_ne!(ctx.config().block_bytes(), 4096));
    })
    .join()
    .unwrap();
}

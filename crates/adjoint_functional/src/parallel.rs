//! Parallel gradient evaluation.
//!
//! Points are distributed over the rayon pool. Each pool thread records on
//! its own thread-local context, so the only shared state is the function
//! itself, which must be `Sync`.

use crate::gradient::gradient;
use adjoint_core::{AdResult, Var};
use rayon::prelude::*;

/// Value and gradient of `f` at each point, in input order.
///
/// # Examples
///
/// ```rust
/// use adjoint_functional::par_gradients;
///
/// let points = vec![vec![1.0, 2.0], vec![3.0, -1.0]];
/// let results = par_gradients(|v| v[0] * v[1], &points).unwrap();
/// assert_eq!(results[0], (2.0, vec![2.0, 1.0]));
/// assert_eq!(results[1], (-3.0, vec![-1.0, 3.0]));
/// ```
///
/// # Errors
///
/// Returns the first error reported by any evaluation.
pub fn par_gradients<F>(f: F, points: &[Vec<f64>]) -> AdResult<Vec<(f64, Vec<f64>)>>
where
    F: Fn(&[Var]) -> Var + Sync,
{
    tracing::debug!(points = points.len(), "evaluating gradients in parallel");
    points.par_iter().map(|x| gradient(&f, x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_par_gradients_matches_sequential() {
        let f = |v: &[Var]| (v[0] * v[1]).sin() + v[0].exp();
        let points: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![0.01 * i as f64, 1.0 - 0.005 * i as f64])
            .collect();

        let parallel = par_gradients(f, &points).unwrap();
        for (x, (value, grad)) in points.iter().zip(&parallel) {
            let (seq_value, seq_grad) = gradient(f, x).unwrap();
            assert_relative_eq!(*value, seq_value);
            assert_relative_eq!(grad[0], seq_grad[0]);
            assert_relative_eq!(grad[1], seq_grad[1]);
        }
    }

    #[test]
    fn test_par_gradients_empty_input() {
        let results = par_gradients(|v| v[0], &[]).unwrap();
        assert!(results.is_empty());
    }
}

//! Reverse-mode drivers.
//!
//! Every driver records its forward pass inside a nested episode on the
//! calling thread, so the work it does is discarded on return and any tape
//! the caller is building stays as it was.

use adjoint_core::{nested, AdResult, Var};

fn leaves(x: &[f64]) -> Vec<Var> {
    x.iter().map(|&v| Var::new(v)).collect()
}

/// Value and gradient of `f` at `x`.
///
/// # Examples
///
/// ```rust
/// use adjoint_functional::gradient;
///
/// let (fx, grad) = gradient(|v| v[0] * v[0] * v[1], &[3.0, 2.0]).unwrap();
/// assert_eq!(fx, 18.0);
/// assert_eq!(grad, vec![12.0, 9.0]);
/// ```
///
/// # Errors
///
/// Returns `AdError::SeedOutsideSegment` if `f` returns a handle created
/// before the call.
pub fn gradient<F>(f: F, x: &[f64]) -> AdResult<(f64, Vec<f64>)>
where
    F: FnOnce(&[Var]) -> Var,
{
    try_gradient(|v| Ok(f(v)), x)
}

/// Like [`gradient`] for functions that can fail while recording.
///
/// # Errors
///
/// Propagates any error returned by `f`, after the episode is recovered.
pub fn try_gradient<F>(f: F, x: &[f64]) -> AdResult<(f64, Vec<f64>)>
where
    F: FnOnce(&[Var]) -> AdResult<Var>,
{
    nested(|| -> AdResult<(f64, Vec<f64>)> {
        let vars = leaves(x);
        let y = f(&vars)?;
        y.grad()?;
        Ok((y.value(), vars.iter().map(Var::adjoint).collect()))
    })
}

/// Value and derivative of a scalar function at `x`.
///
/// # Errors
///
/// See [`gradient`].
pub fn derivative<F>(f: F, x: f64) -> AdResult<(f64, f64)>
where
    F: FnOnce(Var) -> Var,
{
    nested(|| -> AdResult<(f64, f64)> {
        let v = Var::new(x);
        let y = f(v);
        y.grad()?;
        Ok((y.value(), v.adjoint()))
    })
}

/// Values and Jacobian of a vector function at `x`.
///
/// One forward pass is recorded and swept once per output, so row `i` of
/// the Jacobian holds the gradient of output `i`.
///
/// # Examples
///
/// ```rust
/// use adjoint_functional::jacobian;
///
/// let (fx, jac) = jacobian(|v| vec![v[0] * v[1], v[0] + v[1]], &[2.0, 5.0]).unwrap();
/// assert_eq!(fx, vec![10.0, 7.0]);
/// assert_eq!(jac, vec![vec![5.0, 2.0], vec![1.0, 1.0]]);
/// ```
///
/// # Errors
///
/// See [`gradient`].
pub fn jacobian<F>(f: F, x: &[f64]) -> AdResult<(Vec<f64>, Vec<Vec<f64>>)>
where
    F: FnOnce(&[Var]) -> Vec<Var>,
{
    nested(|| -> AdResult<(Vec<f64>, Vec<Vec<f64>>)> {
        let vars = leaves(x);
        let outputs = f(&vars);
        let values = outputs.iter().map(Var::value).collect();
        let mut rows = Vec::with_capacity(outputs.len());
        for y in &outputs {
            y.grad()?;
            rows.push(vars.iter().map(Var::adjoint).collect());
        }
        tracing::trace!(inputs = x.len(), outputs = outputs.len(), "jacobian swept");
        Ok((values, rows))
    })
}

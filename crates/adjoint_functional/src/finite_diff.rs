//! Finite differences and gradient verification.
//!
//! Centered differences give an independent estimate to compare recorded
//! gradients against:
//!
//! ```text
//! ∂f/∂xᵢ ≈ (f(x + h eᵢ) - f(x - h eᵢ)) / 2h
//! ```
//!
//! [`check_gradient`] accepts a component when
//! `|ad - fd| <= tolerance × max(1, |ad|)`.

use crate::gradient::gradient;
use adjoint_core::validate::{check_finite, check_positive};
use adjoint_core::{nested, AdResult, Var};

/// Default finite-difference step.
pub const DEFAULT_STEP: f64 = 1e-6;

/// Default scaled tolerance for [`check_gradient`].
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Value and centered-difference gradient of `f` at `x`.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if `step` is not positive and finite.
pub fn finite_diff_gradient<F>(f: F, x: &[f64], step: f64) -> AdResult<(f64, Vec<f64>)>
where
    F: Fn(&[f64]) -> f64,
{
    check_step("finite_diff_gradient", step)?;
    let fx = f(x);
    let mut point = x.to_vec();
    let grad = (0..x.len())
        .map(|i| {
            point[i] = x[i] + step;
            let up = f(&point);
            point[i] = x[i] - step;
            let down = f(&point);
            point[i] = x[i];
            (up - down) / (2.0 * step)
        })
        .collect();
    Ok((fx, grad))
}

/// Hessian of `f` at `x` from centered differences of recorded gradients.
///
/// The result is symmetrised as `(H + Hᵀ) / 2`.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if `step` is not positive and finite,
/// or any error of the underlying gradient evaluations.
pub fn finite_diff_hessian<F>(f: F, x: &[f64], step: f64) -> AdResult<Vec<Vec<f64>>>
where
    F: Fn(&[Var]) -> Var,
{
    check_step("finite_diff_hessian", step)?;
    let n = x.len();
    let mut hessian = vec![vec![0.0; n]; n];
    let mut point = x.to_vec();
    for i in 0..n {
        point[i] = x[i] + step;
        let (_, up) = gradient(&f, &point)?;
        point[i] = x[i] - step;
        let (_, down) = gradient(&f, &point)?;
        point[i] = x[i];
        for j in 0..n {
            hessian[i][j] = (up[j] - down[j]) / (2.0 * step);
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (hessian[i][j] + hessian[j][i]);
            hessian[i][j] = avg;
            hessian[j][i] = avg;
        }
    }
    Ok(hessian)
}

fn check_step(function: &'static str, step: f64) -> AdResult<()> {
    check_finite(function, "step", step)?;
    check_positive(function, "step", step)
}

/// Settings for [`check_gradient`].
///
/// # Examples
///
/// ```rust
/// use adjoint_functional::GradientCheck;
///
/// let check = GradientCheck::default().with_step(1e-5).with_tolerance(1e-8);
/// assert_eq!(check.step(), 1e-5);
/// assert_eq!(check.tolerance(), 1e-8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientCheck {
    step: f64,
    tolerance: f64,
}

impl GradientCheck {
    /// Sets the finite-difference step.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Sets the scaled tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Finite-difference step.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Scaled tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Default for GradientCheck {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of [`check_gradient`].
#[derive(Clone, Debug, PartialEq)]
pub struct GradientReport {
    /// Function value at the checked point
    pub value: f64,
    /// Gradient from the reverse sweep
    pub analytic: Vec<f64>,
    /// Gradient from centered differences
    pub finite_diff: Vec<f64>,
    /// Indices of components outside tolerance
    pub failures: Vec<usize>,
    /// Largest `|ad - fd| / max(1, |ad|)` over all components
    pub max_scaled_error: f64,
}

impl GradientReport {
    /// Whether every component is within tolerance.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compares the recorded gradient of `f` at `x` with centered differences.
///
/// Both estimates evaluate the same function. Finite differences run each
/// forward pass in its own nested episode and read only the value.
///
/// # Examples
///
/// ```rust
/// use adjoint_functional::{check_gradient, GradientCheck};
///
/// let report = check_gradient(|v| v[0].exp() * v[1].sin(), &[0.3, 1.1], GradientCheck::default())
///     .unwrap();
/// assert!(report.passed());
/// ```
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` for an invalid step or tolerance, or
/// any error of the gradient evaluation.
pub fn check_gradient<F>(f: F, x: &[f64], check: GradientCheck) -> AdResult<GradientReport>
where
    F: Fn(&[Var]) -> Var,
{
    check_finite("check_gradient", "tolerance", check.tolerance)?;
    check_positive("check_gradient", "tolerance", check.tolerance)?;

    let (value, analytic) = gradient(&f, x)?;
    let forward = |p: &[f64]| {
        nested(|| {
            let vars: Vec<Var> = p.iter().map(|&v| Var::new(v)).collect();
            f(&vars).value()
        })
    };
    let (_, finite_diff) = finite_diff_gradient(forward, x, check.step)?;

    let mut failures = Vec::new();
    let mut max_scaled_error = 0.0f64;
    for (i, (ad, fd)) in analytic.iter().zip(&finite_diff).enumerate() {
        let scaled = (ad - fd).abs() / ad.abs().max(1.0);
        max_scaled_error = max_scaled_error.max(scaled);
        if scaled.is_nan() || scaled > check.tolerance {
            failures.push(i);
        }
    }

    if failures.is_empty() {
        tracing::debug!(dim = x.len(), max_scaled_error, "gradient check passed");
    } else {
        tracing::warn!(
            dim = x.len(),
            failed = failures.len(),
            max_scaled_error,
            "gradient check found components outside tolerance"
        );
    }

    Ok(GradientReport {
        value,
        analytic,
        finite_diff,
        failures,
        max_scaled_error,
    })
}

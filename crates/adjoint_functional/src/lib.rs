//! # adjoint_functional
//!
//! Function-level drivers on top of `adjoint_core`.
//!
//! ## Architecture Position
//!
//! Layer 2. Depends only on `adjoint_core` (L1). Every driver wraps its
//! forward pass in a nested episode, so it can be called from inside a
//! larger computation without leaving nodes behind.
//!
//! ## Modules
//!
//! - `gradient`: `gradient`, `try_gradient`, `derivative`, `jacobian`
//! - `finite_diff`: centered differences, Hessians and gradient checks
//! - `parallel`: `par_gradients` over the rayon pool (feature `parallel`)
//!
//! ## Example
//!
//! ```rust
//! use adjoint_functional::{check_gradient, gradient, GradientCheck};
//!
//! let f = |v: &[adjoint_core::Var]| v[0] * v[0] + 3.0 * v[0] * v[1];
//!
//! let (fx, grad) = gradient(f, &[3.0, 4.0]).unwrap();
//! assert_eq!(fx, 45.0);
//! assert_eq!(grad, vec![18.0, 9.0]);
//!
//! let report = check_gradient(f, &[3.0, 4.0], GradientCheck::default()).unwrap();
//! assert!(report.passed());
//! ```

#![deny(missing_docs)]

pub mod finite_diff;
pub mod gradient;
#[cfg(feature = "parallel")]
pub mod parallel;

pub use finite_diff::{
    check_gradient, finite_diff_gradient, finite_diff_hessian, GradientCheck, GradientReport,
};
pub use gradient::{derivative, gradient, jacobian, try_gradient};
#[cfg(feature = "parallel")]
pub use parallel::par_gradients;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::finite_diff::*;
    pub use crate::gradient::*;
    #[cfg(feature = "parallel")]
    pub use crate::parallel::*;
    pub use adjoint_core::{AdError, AdResult, Var};
}

//! Tracked scalar handles.
//!
//! A [`Var`] is a copyable reference to one node in this thread's context.
//! Every operation on handles reads the operand values, records a new node
//! with its local partials and returns a handle to it. Existing nodes are
//! never modified, so reusing an intermediate result in several downstream
//! expressions shares one node.
//!
//! # Usage
//!
//! ```rust
//! use adjoint_core::Var;
//!
//! let x = Var::new(3.0);
//! let y = Var::new(4.0);
//! let z = x * x + 3.0 * x * y;
//! z.grad().unwrap();
//!
//! assert_eq!(z.value(), 45.0);
//! assert_eq!(x.adjoint(), 18.0); // 2x + 3y
//! assert_eq!(y.adjoint(), 9.0); // 3x
//! ```
//!
//! Handles index thread-local state, so `Var` is neither `Send` nor `Sync`.
//! A handle created inside a nested episode must not be used after the
//! episode is recovered.

mod math;
mod ops;
mod reduce;

pub use reduce::{dot, dot_values, log_sum_exp, mean, precomputed_gradients, sum};

use crate::context::{try_with_context, with_context, with_context_mut};
use crate::error::AdResult;
use crate::validate::check_finite;
use crate::vari::{Edge, NodeId};
use std::fmt;
use std::marker::PhantomData;

/// Handle to a node recorded on this thread's tape.
#[derive(Clone, Copy)]
pub struct Var {
    id: NodeId,
    _worker: PhantomData<*const ()>,
}

impl Var {
    /// Records a leaf holding `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use adjoint_core::Var;
    ///
    /// let x = Var::new(1.5);
    /// assert_eq!(x.value(), 1.5);
    /// assert_eq!(x.adjoint(), 0.0);
    /// ```
    pub fn new(value: f64) -> Self {
        Self::from_id(with_context_mut(|ctx| ctx.leaf(value)))
    }

    /// Records a leaf, rejecting NaN and infinite values.
    ///
    /// # Errors
    ///
    /// Returns `AdError::InvalidArgument` if `value` is not finite. No node
    /// is recorded in that case.
    pub fn try_new(value: f64) -> AdResult<Self> {
        check_finite("Var::try_new", "value", value)?;
        Ok(Self::new(value))
    }

    #[inline]
    pub(crate) fn from_id(id: NodeId) -> Self {
        Self {
            id,
            _worker: PhantomData,
        }
    }

    /// Node referenced by this handle.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Forward value. Reads only, never records or propagates anything.
    #[inline]
    pub fn value(&self) -> f64 {
        with_context(|ctx| ctx.value(self.id))
    }

    /// Adjoint left by the most recent sweep.
    #[inline]
    pub fn adjoint(&self) -> f64 {
        with_context(|ctx| ctx.adjoint(self.id))
    }

    /// Runs a reverse sweep seeded at this handle.
    ///
    /// # Errors
    ///
    /// Returns `AdError::SeedOutsideSegment` if this handle was created
    /// before the innermost open nested episode.
    pub fn grad(&self) -> AdResult<()> {
        with_context_mut(|ctx| ctx.grad(self.id))
    }

    // =========================================================================
    // Node construction
    // =========================================================================

    /// Records `f(x)` where `rule(x)` returns the value and `∂f/∂x`.
    #[inline]
    pub(crate) fn map_unary(self, rule: impl FnOnce(f64) -> (f64, f64)) -> Self {
        Self::from_id(with_context_mut(|ctx| {
            let (value, partial) = rule(ctx.value(self.id));
            ctx.unary(value, self.id, partial)
        }))
    }

    /// Records `f(a, b)` where `rule(a, b)` returns the value, `∂f/∂a` and
    /// `∂f/∂b`.
    #[inline]
    pub(crate) fn map_binary(self, rhs: Var, rule: impl FnOnce(f64, f64) -> (f64, f64, f64)) -> Self {
        Self::from_id(with_context_mut(|ctx| {
            let (value, dl, dr) = rule(ctx.value(self.id), ctx.value(rhs.id));
            ctx.binary(value, self.id, dl, rhs.id, dr)
        }))
    }

    /// Records a node with arbitrary fan-in.
    pub(crate) fn from_edges(value: f64, edges: &[Edge]) -> Self {
        Self::from_id(with_context_mut(|ctx| ctx.nary(value, edges)))
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Var");
        s.field("id", &self.id);
        if let Some((value, adjoint)) =
            try_with_context(|ctx| (ctx.value(self.id), ctx.adjoint(self.id)))
        {
            s.field("value", &value).field("adjoint", &adjoint);
        }
        s.finish()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match try_with_context(|ctx| ctx.value(self.id)) {
            Some(value) => fmt::Display::fmt(&value, f),
            None => write!(f, "Var({})", self.id),
        }
    }
}

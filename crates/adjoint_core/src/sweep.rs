//! Reverse sweep.
//!
//! A sweep seeded at node `s` zeroes every adjoint in the active segment,
//! sets `adj(s) = 1` and walks the segment from the newest entry to the
//! oldest, calling [`propagate`](crate::vari) on each. Since the tape is in
//! creation order, a node is always visited after every node that consumes
//! it, so its adjoint is complete when it propagates:
//!
//! ```text
//! adj(x) = Σ adj(y) × ∂y/∂x    over all consumers y of x
//! ```
//!
//! The active segment is the whole tape at depth 0, and the nodes created
//! since the innermost nested episode opened otherwise.

use crate::context::{with_context_mut, AdContext};
use crate::error::{AdError, AdResult};
use crate::vari::{propagate, NodeId};

impl AdContext {
    /// Runs a reverse sweep seeded at `seed`.
    ///
    /// After it returns, the adjoint of every node in the active segment is
    /// the partial derivative of `seed` with respect to that node. The tape
    /// is kept, so further sweeps with other seeds may follow.
    ///
    /// # Errors
    ///
    /// Returns `AdError::SeedOutsideSegment` if `seed` was created before the
    /// innermost open nested episode.
    pub fn grad(&mut self, seed: NodeId) -> AdResult<()> {
        let (start, boundary) = self.segment_start();
        if seed.0 < boundary {
            return Err(AdError::SeedOutsideSegment {
                seed,
                segment_start: boundary,
            });
        }

        self.set_zero_nested_adjoints();
        self.nodes.get_mut(seed.0).adjoint = 1.0;

        let segment = self.tape.segment(start);
        tracing::trace!(
            seed = %seed,
            segment_len = segment.len(),
            depth = self.nested.len(),
            "reverse sweep"
        );
        for &id in segment.iter().rev() {
            propagate(&mut self.nodes, &self.edges, id);
        }
        self.sweeps += 1;
        Ok(())
    }

    /// Sets the adjoint of every node on the tape to zero.
    pub fn set_zero_all_adjoints(&mut self) {
        for &id in self.tape.segment(0) {
            self.nodes.get_mut(id.0).adjoint = 0.0;
        }
    }

    /// Sets the adjoint of every node in the active segment to zero.
    pub fn set_zero_nested_adjoints(&mut self) {
        let (start, _) = self.segment_start();
        for &id in self.tape.segment(start) {
            self.nodes.get_mut(id.0).adjoint = 0.0;
        }
    }
}

/// Sets every adjoint on this thread's tape to zero.
pub fn set_zero_all_adjoints() {
    with_context_mut(AdContext::set_zero_all_adjoints)
}

/// Sets every adjoint in this thread's active segment to zero.
pub fn set_zero_nested_adjoints() {
    with_context_mut(AdContext::set_zero_nested_adjoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;

    fn small_context() -> AdContext {
        AdContext::new(ContextConfig::builder().block_bytes(1024).build().unwrap())
    }

    #[test]
    fn test_grad_shared_operand_accumulates() {
        // z = a*a with a single node referenced twice
        let mut ctx = small_context();
        let a = ctx.leaf(3.0);
        let z = ctx.binary(9.0, a, 3.0, a, 3.0);
        ctx.grad(z).unwrap();
        assert_eq!(ctx.adjoint(a), 6.0);
        assert_eq!(ctx.adjoint(z), 1.0);
    }

    #[test]
    fn test_grad_repeated_sweeps_reset_adjoints() {
        let mut ctx = small_context();
        let x = ctx.leaf(2.0);
        let y = ctx.unary(4.0, x, 4.0);
        let z = ctx.unary(6.0, x, 3.0);

        ctx.grad(y).unwrap();
        assert_eq!(ctx.adjoint(x), 4.0);
        ctx.grad(z).unwrap();
        assert_eq!(ctx.adjoint(x), 3.0);
        assert_eq!(ctx.adjoint(y), 0.0);
        assert_eq!(ctx.stats().sweeps, 2);
    }

    #[test]
    fn test_grad_long_chain_spans_blocks() {
        // x_i = 2 * x_{i-1}
        let mut ctx = small_context();
        let x1 = ctx.leaf(1.0);
        let mut xi = x1;
        for _ in 1..40 {
            let v = 2.0 * ctx.value(xi);
            xi = ctx.unary(v, xi, 2.0);
        }
        assert!(ctx.node_usage().blocks > 1);
        ctx.grad(xi).unwrap();
        assert_eq!(ctx.adjoint(x1), 2f64.powi(39));
    }

    #[test]
    fn test_grad_rejects_seed_outside_segment() {
        let mut ctx = small_context();
        let outer = ctx.leaf(1.0);
        let token = ctx.start_nested();
        assert!(matches!(
            ctx.grad(outer),
            Err(AdError::SeedOutsideSegment { .. })
        ));
        ctx.recover_nested(token).unwrap();
        assert!(ctx.grad(outer).is_ok());
    }

    #[test]
    fn test_nested_sweep_leaves_outer_segment_unswept() {
        let mut ctx = small_context();
        let a = ctx.leaf(2.0);
        let b = ctx.unary(4.0, a, 2.0);
        ctx.grad(b).unwrap();
        assert_eq!(ctx.adjoint(a), 2.0);

        let token = ctx.start_nested();
        let c = ctx.leaf(5.0);
        let d = ctx.unary(10.0, c, 2.0);
        ctx.grad(d).unwrap();
        assert_eq!(ctx.adjoint(c), 2.0);
        // The outer node b is not in the active segment, so it neither
        // propagated again nor was zeroed.
        assert_eq!(ctx.adjoint(b), 1.0);
        assert_eq!(ctx.adjoint(a), 2.0);
        ctx.recover_nested(token).unwrap();
    }

    #[test]
    fn test_set_zero_all_adjoints() {
        let mut ctx = small_context();
        let a = ctx.leaf(2.0);
        let b = ctx.unary(4.0, a, 2.0);
        ctx.grad(b).unwrap();
        ctx.set_zero_all_adjoints();
        assert_eq!(ctx.adjoint(a), 0.0);
        assert_eq!(ctx.adjoint(b), 0.0);
    }

    #[test]
    fn test_set_zero_nested_adjoints_keeps_outer() {
        let mut ctx = small_context();
        let a = ctx.leaf(2.0);
        let b = ctx.unary(4.0, a, 2.0);
        ctx.grad(b).unwrap();

        let token = ctx.start_nested();
        let c = ctx.unary(6.0, a, 3.0);
        ctx.grad(c).unwrap();
        ctx.set_zero_nested_adjoints();
        assert_eq!(ctx.adjoint(c), 0.0);
        assert_eq!(ctx.adjoint(b), 1.0);
        ctx.recover_nested(token).unwrap();
    }
}

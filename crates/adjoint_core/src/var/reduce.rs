//! Reductions over many operands.
//!
//! Each reduction records a single n-ary node whose edges live in the edge
//! arena, instead of a chain of binary nodes.

use super::Var;
use crate::context::with_context_mut;
use crate::error::{AdError, AdResult};
use crate::validate::check_consistent_sizes;
use crate::vari::Edge;

fn empty_input(function: &'static str, argument: &'static str) -> AdError {
    AdError::InvalidArgument {
        function,
        argument,
        value: "empty".to_string(),
        requirement: "non-empty".to_string(),
    }
}

/// Sum of all terms. An empty slice gives a constant zero.
///
/// ```rust
/// use adjoint_core::{sum, Var};
///
/// let xs = [Var::new(1.0), Var::new(2.0), Var::new(4.0)];
/// let total = sum(&xs);
/// assert_eq!(total.value(), 7.0);
/// ```
pub fn sum(terms: &[Var]) -> Var {
    if terms.is_empty() {
        return Var::new(0.0);
    }
    Var::from_id(with_context_mut(|ctx| {
        let value: f64 = terms.iter().map(|t| ctx.value(t.id)).sum();
        let edges: Vec<Edge> = terms
            .iter()
            .map(|t| Edge {
                operand: t.id,
                partial: 1.0,
            })
            .collect();
        ctx.nary(value, &edges)
    }))
}

/// Arithmetic mean of all terms.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if `terms` is empty.
pub fn mean(terms: &[Var]) -> AdResult<Var> {
    if terms.is_empty() {
        return Err(empty_input("mean", "terms"));
    }
    let weight = 1.0 / terms.len() as f64;
    Ok(Var::from_id(with_context_mut(|ctx| {
        let value = terms.iter().map(|t| ctx.value(t.id)).sum::<f64>() * weight;
        let edges: Vec<Edge> = terms
            .iter()
            .map(|t| Edge {
                operand: t.id,
                partial: weight,
            })
            .collect();
        ctx.nary(value, &edges)
    })))
}

/// Inner product of two tracked vectors.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if the lengths differ.
pub fn dot(lhs: &[Var], rhs: &[Var]) -> AdResult<Var> {
    check_consistent_sizes("dot", "rhs", rhs.len(), lhs.len())?;
    Ok(Var::from_id(with_context_mut(|ctx| {
        let mut value = 0.0;
        let mut edges = Vec::with_capacity(2 * lhs.len());
        for (a, b) in lhs.iter().zip(rhs) {
            let (va, vb) = (ctx.value(a.id), ctx.value(b.id));
            value += va * vb;
            edges.push(Edge {
                operand: a.id,
                partial: vb,
            });
            edges.push(Edge {
                operand: b.id,
                partial: va,
            });
        }
        ctx.nary(value, &edges)
    })))
}

/// Inner product of a tracked vector with constant weights.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if the lengths differ.
pub fn dot_values(lhs: &[Var], weights: &[f64]) -> AdResult<Var> {
    check_consistent_sizes("dot_values", "weights", weights.len(), lhs.len())?;
    Ok(Var::from_id(with_context_mut(|ctx| {
        let value: f64 = lhs
            .iter()
            .zip(weights)
            .map(|(a, w)| ctx.value(a.id) * w)
            .sum();
        let edges: Vec<Edge> = lhs
            .iter()
            .zip(weights)
            .map(|(a, &w)| Edge {
                operand: a.id,
                partial: w,
            })
            .collect();
        ctx.nary(value, &edges)
    })))
}

/// `ln Σ exp(xᵢ)`, shifted by the maximum to avoid overflow.
///
/// The partials are the softmax weights `exp(xᵢ - value)`. When the
/// maximum is infinite the value is that infinity and every partial is 0.
/// Any NaN term makes the value NaN.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if `terms` is empty.
pub fn log_sum_exp(terms: &[Var]) -> AdResult<Var> {
    if terms.is_empty() {
        return Err(empty_input("log_sum_exp", "terms"));
    }
    Ok(Var::from_id(with_context_mut(|ctx| {
        let values: Vec<f64> = terms.iter().map(|t| ctx.value(t.id)).collect();
        // f64::max skips NaN, so it is checked first
        if values.iter().any(|v| v.is_nan()) {
            let edges: Vec<Edge> = terms
                .iter()
                .map(|t| Edge {
                    operand: t.id,
                    partial: f64::NAN,
                })
                .collect();
            return ctx.nary(f64::NAN, &edges);
        }
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (value, edges): (f64, Vec<Edge>) = if max.is_infinite() {
            let edges = terms
                .iter()
                .map(|t| Edge {
                    operand: t.id,
                    partial: 0.0,
                })
                .collect();
            (max, edges)
        } else {
            let total: f64 = values.iter().map(|v| (v - max).exp()).sum();
            let value = max + total.ln();
            let edges = terms
                .iter()
                .zip(&values)
                .map(|(t, v)| Edge {
                    operand: t.id,
                    partial: (v - value).exp(),
                })
                .collect();
            (value, edges)
        };
        ctx.nary(value, &edges)
    })))
}

/// Records a node with a caller-supplied value and gradient.
///
/// Used by routines that compute a result and its partials by other means,
/// for example inside a nested episode, and need to splice them back into
/// the enclosing tape.
///
/// # Errors
///
/// Returns `AdError::InvalidArgument` if `operands` and `partials` differ in
/// length. No node is recorded in that case.
///
/// # Examples
///
/// ```rust
/// use adjoint_core::{precomputed_gradients, Var};
///
/// let a = Var::new(2.0);
/// let b = Var::new(5.0);
/// // f(a, b) = a * b computed out of band
/// let f = precomputed_gradients(10.0, &[a, b], &[5.0, 2.0]).unwrap();
/// f.grad().unwrap();
/// assert_eq!(a.adjoint(), 5.0);
/// assert_eq!(b.adjoint(), 2.0);
/// ```
pub fn precomputed_gradients(value: f64, operands: &[Var], partials: &[f64]) -> AdResult<Var> {
    check_consistent_sizes(
        "precomputed_gradients",
        "partials",
        partials.len(),
        operands.len(),
    )?;
    let edges: Vec<Edge> = operands
        .iter()
        .zip(partials)
        .map(|(o, &p)| Edge {
            operand: o.id,
            partial: p,
        })
        .collect();
    Ok(Var::from_edges(value, &edges))
}

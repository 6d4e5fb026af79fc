//! Computation nodes.
//!
//! A [`Vari`] is the record left behind by one elementary operation: its
//! forward value, the adjoint accumulated during a sweep, and a [`Shape`]
//! carrying the operand references with their local partial derivatives.
//! Nodes only reference operands created before them, never successors.
//!
//! Shapes form a closed set:
//!
//! | Shape | Operands | Used by |
//! |-------|----------|---------|
//! | `Leaf` | none | inputs and constants |
//! | `Unary` | 1 | elementary functions, operations with a scalar |
//! | `Binary` | 2 | arithmetic between two tracked values |
//! | `Nary` | any | reductions and precomputed gradients |

use crate::arena::{Arena, ArenaIndex, ArenaSlice};
use std::fmt;

/// Identifier of a node in the worker's node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) ArenaIndex);

impl NodeId {
    /// Arena location of the node.
    #[inline]
    pub fn index(&self) -> ArenaIndex {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One `(operand, partial)` pair of an n-ary node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    /// Operand node.
    pub operand: NodeId,
    /// Partial derivative of the node's value with respect to the operand.
    pub partial: f64,
}

/// Operand layout and local partials of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    /// No operands.
    Leaf,
    /// One operand.
    Unary {
        /// Operand node
        operand: NodeId,
        /// ∂value/∂operand
        partial: f64,
    },
    /// Two operands.
    Binary {
        /// Left operand node
        lhs: NodeId,
        /// ∂value/∂lhs
        lhs_partial: f64,
        /// Right operand node
        rhs: NodeId,
        /// ∂value/∂rhs
        rhs_partial: f64,
    },
    /// Any number of operands stored in the edge arena.
    Nary {
        /// Edge run in the edge arena
        edges: ArenaSlice,
    },
}

/// A recorded operation result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vari {
    /// Forward value, written once at construction.
    pub value: f64,
    /// Accumulated derivative of the sweep seed with respect to `value`.
    pub adjoint: f64,
    /// Operands and local partials.
    pub shape: Shape,
}

impl Vari {
    /// Creates a node with a zero adjoint.
    #[inline]
    pub fn new(value: f64, shape: Shape) -> Self {
        Self {
            value,
            adjoint: 0.0,
            shape,
        }
    }

    /// Creates a leaf.
    #[inline]
    pub fn leaf(value: f64) -> Self {
        Self::new(value, Shape::Leaf)
    }

    /// Number of operands.
    pub fn arity(&self) -> usize {
        match self.shape {
            Shape::Leaf => 0,
            Shape::Unary { .. } => 1,
            Shape::Binary { .. } => 2,
            Shape::Nary { edges } => edges.len(),
        }
    }
}

/// Propagates the adjoint of `id` into its operands.
///
/// Adds `adjoint * partial` to each operand's adjoint. A node with an adjoint
/// of exactly zero contributes nothing, so nodes off the seed's path never
/// touch their operands.
#[inline]
pub(crate) fn propagate(nodes: &mut Arena<Vari>, edges: &Arena<Edge>, id: NodeId) {
    let node = *nodes.get(id.0);
    if node.adjoint == 0.0 {
        return;
    }
    let adj = node.adjoint;
    match node.shape {
        Shape::Leaf => {}
        Shape::Unary { operand, partial } => {
            nodes.get_mut(operand.0).adjoint += adj * partial;
        }
        Shape::Binary {
            lhs,
            lhs_partial,
            rhs,
            rhs_partial,
        } => {
            nodes.get_mut(lhs.0).adjoint += adj * lhs_partial;
            nodes.get_mut(rhs.0).adjoint += adj * rhs_partial;
        }
        Shape::Nary { edges: run } => {
            for edge in edges.slice(run) {
                nodes.get_mut(edge.operand.0).adjoint += adj * edge.partial;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arenas() -> (Arena<Vari>, Arena<Edge>) {
        (Arena::with_block_bytes(1024), Arena::with_block_bytes(1024))
    }

    #[test]
    fn test_leaf_has_no_operands() {
        let v = Vari::leaf(2.0);
        assert_eq!(v.arity(), 0);
        assert_eq!(v.adjoint, 0.0);
    }

    #[test]
    fn test_propagate_binary_accumulates() {
        let (mut nodes, edges) = arenas();
        let a = NodeId(nodes.alloc(Vari::leaf(3.0)));
        let b = NodeId(nodes.alloc(Vari::leaf(4.0)));
        let mut prod = Vari::new(
            12.0,
            Shape::Binary {
                lhs: a,
                lhs_partial: 4.0,
                rhs: b,
                rhs_partial: 3.0,
            },
        );
        prod.adjoint = 2.0;
        let p = NodeId(nodes.alloc(prod));
        nodes.get_mut(a.0).adjoint = 1.0;

        propagate(&mut nodes, &edges, p);

        assert_eq!(nodes.get(a.0).adjoint, 9.0);
        assert_eq!(nodes.get(b.0).adjoint, 6.0);
    }

    #[test]
    fn test_propagate_nary_reads_edge_arena() {
        let (mut nodes, mut edges) = arenas();
        let a = NodeId(nodes.alloc(Vari::leaf(1.0)));
        let b = NodeId(nodes.alloc(Vari::leaf(2.0)));
        let run = edges.alloc_slice(&[
            Edge {
                operand: a,
                partial: 0.5,
            },
            Edge {
                operand: b,
                partial: -1.0,
            },
            Edge {
                operand: a,
                partial: 0.25,
            },
        ]);
        let mut n = Vari::new(0.0, Shape::Nary { edges: run });
        n.adjoint = 4.0;
        let id = NodeId(nodes.alloc(n));
        assert_eq!(nodes.get(id.0).arity(), 3);

        propagate(&mut nodes, &edges, id);

        assert_eq!(nodes.get(a.0).adjoint, 3.0);
        assert_eq!(nodes.get(b.0).adjoint, -4.0);
    }

    #[test]
    fn test_propagate_skips_zero_adjoint() {
        let (mut nodes, edges) = arenas();
        let a = NodeId(nodes.alloc(Vari::leaf(1.0)));
        let n = NodeId(nodes.alloc(Vari::new(
            f64::NAN,
            Shape::Unary {
                operand: a,
                partial: f64::NAN,
            },
        )));
        propagate(&mut nodes, &edges, n);
        assert_eq!(nodes.get(a.0).adjoint, 0.0);
    }

    #[test]
    fn test_node_id_display() {
        let mut nodes: Arena<Vari> = Arena::with_block_bytes(1024);
        let id = NodeId(nodes.alloc(Vari::leaf(0.0)));
        assert_eq!(id.to_string(), "#0.0");
    }
}

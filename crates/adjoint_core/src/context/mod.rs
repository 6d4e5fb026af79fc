//! Per-worker differentiation state.
//!
//! An [`AdContext`] owns everything one worker needs to record and sweep a
//! computation: the node arena, the edge arena backing n-ary nodes, the tape
//! and the nested-episode stack. Node ids from one context have no meaning
//! in another, so each thread gets its own context through thread-local
//! storage and [`Var`](crate::Var) handles are neither `Send` nor `Sync`.
//! No locking is involved; isolation comes from distinct instances.
//!
//! `AdContext` can also be used directly as an explicit, id-level API:
//!
//! ```rust
//! use adjoint_core::{AdContext, ContextConfig};
//!
//! let mut ctx = AdContext::new(ContextConfig::default());
//! let x = ctx.leaf(3.0);
//! let y = ctx.unary(9.0, x, 6.0); // y = x², dy/dx = 2x
//! ctx.grad(y).unwrap();
//! assert_eq!(ctx.adjoint(x), 6.0);
//! ```

mod config;
mod nested;

pub use config::{
    ContextConfig, ContextConfigBuilder, DEFAULT_TAPE_CAPACITY, ENV_BLOCK_BYTES,
    ENV_INITIAL_TAPE_CAPACITY, ENV_MAX_BYTES, ENV_WARNING_THRESHOLD, MAX_BLOCK_BYTES,
    MIN_BLOCK_BYTES,
};
pub use nested::{
    nested, nested_depth, recover_nested, start_nested, NestedGuard, NestedScope, NestedToken,
    RecoverError,
};

use crate::arena::{Arena, ArenaMark, ArenaUsage};
use crate::error::{AdError, AdResult};
use crate::tape::Tape;
use crate::vari::{Edge, NodeId, Shape, Vari};
use std::alloc::{handle_alloc_error, Layout};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for context identities, used to reject foreign nested tokens.
static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Saved state at the start of a nested episode.
#[derive(Clone, Copy, Debug)]
pub(crate) struct NestedFrame {
    pub(crate) nodes: ArenaMark,
    pub(crate) edges: ArenaMark,
    pub(crate) tape_len: usize,
}

/// Snapshot of a context's memory and tape state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContextStats {
    /// Nodes on the tape.
    pub tape_len: usize,
    /// Bytes occupied by nodes.
    pub node_bytes: usize,
    /// Bytes occupied by n-ary edges.
    pub edge_bytes: usize,
    /// Bytes reserved by both arenas.
    pub reserved_bytes: usize,
    /// Open nested episodes.
    pub nested_depth: usize,
    /// Reverse sweeps run since the context was created.
    pub sweeps: u64,
}

/// Arena, tape and nested stack of one worker.
pub struct AdContext {
    pub(crate) id: u64,
    pub(crate) nodes: Arena<Vari>,
    pub(crate) edges: Arena<Edge>,
    pub(crate) tape: Tape,
    pub(crate) nested: Vec<NestedFrame>,
    pub(crate) sweeps: u64,
    config: ContextConfig,
}

impl AdContext {
    /// Creates an empty context.
    pub fn new(config: ContextConfig) -> Self {
        let mut nodes = Arena::with_block_bytes(config.block_bytes());
        let mut edges = Arena::with_block_bytes(config.block_bytes());
        if let Some(budget) = config.budget() {
            nodes = nodes.with_budget(budget);
            edges = edges.with_budget(budget);
        }
        Self {
            id: CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            nodes,
            edges,
            tape: Tape::with_capacity(config.initial_tape_capacity()),
            nested: Vec::new(),
            sweeps: 0,
            config,
        }
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AdError::ContextInUse` unless the tape is empty and no
    /// nested episode is open, or `AdError::Config` if `config` is invalid.
    pub fn reconfigure(&mut self, config: ContextConfig) -> AdResult<()> {
        config.validate()?;
        if !self.tape.is_empty() || !self.nested.is_empty() {
            return Err(AdError::ContextInUse {
                tape_len: self.tape.len(),
            });
        }
        let sweeps = self.sweeps;
        *self = Self::new(config);
        self.sweeps = sweeps;
        Ok(())
    }

    // =========================================================================
    // Node recording
    // =========================================================================

    /// Records a node and appends it to the tape.
    ///
    /// Arena exhaustion here is fatal.
    fn record(&mut self, vari: Vari) -> NodeId {
        match self.nodes.try_alloc(vari) {
            Ok(index) => {
                let id = NodeId(index);
                self.tape.push(id);
                id
            }
            Err(err) => {
                tracing::error!(error = %err, tape_len = self.tape.len(), "node arena exhausted");
                handle_alloc_error(Layout::new::<Vari>())
            }
        }
    }

    /// Records a leaf with no operands.
    pub fn leaf(&mut self, value: f64) -> NodeId {
        self.record(Vari::leaf(value))
    }

    /// Records a node with one operand and its local partial.
    pub fn unary(&mut self, value: f64, operand: NodeId, partial: f64) -> NodeId {
        let partial = if value.is_nan() || self.value(operand).is_nan() {
            f64::NAN
        } else {
            partial
        };
        self.record(Vari::new(value, Shape::Unary { operand, partial }))
    }

    /// Records a node with two operands and their local partials.
    pub fn binary(
        &mut self,
        value: f64,
        lhs: NodeId,
        lhs_partial: f64,
        rhs: NodeId,
        rhs_partial: f64,
    ) -> NodeId {
        let (lhs_partial, rhs_partial) =
            if value.is_nan() || self.value(lhs).is_nan() || self.value(rhs).is_nan() {
                (f64::NAN, f64::NAN)
            } else {
                (lhs_partial, rhs_partial)
            };
        self.record(Vari::new(
            value,
            Shape::Binary {
                lhs,
                lhs_partial,
                rhs,
                rhs_partial,
            },
        ))
    }

    /// Records a node with any number of `(operand, partial)` edges.
    pub fn nary(&mut self, value: f64, edges: &[Edge]) -> NodeId {
        let poisoned =
            value.is_nan() || edges.iter().any(|e| self.value(e.operand).is_nan());
        let stored = if poisoned {
            let nan_edges: Vec<Edge> = edges
                .iter()
                .map(|e| Edge {
                    operand: e.operand,
                    partial: f64::NAN,
                })
                .collect();
            self.edges.try_alloc_slice(&nan_edges)
        } else {
            self.edges.try_alloc_slice(edges)
        };
        match stored {
            Ok(run) => self.record(Vari::new(value, Shape::Nary { edges: run })),
            Err(err) => {
                tracing::error!(error = %err, edges = edges.len(), "edge arena exhausted");
                handle_alloc_error(Layout::new::<Edge>())
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Forward value of a node. Never mutates any state.
    #[inline]
    pub fn value(&self, id: NodeId) -> f64 {
        self.nodes.get(id.0).value
    }

    /// Current adjoint of a node.
    #[inline]
    pub fn adjoint(&self, id: NodeId) -> f64 {
        self.nodes.get(id.0).adjoint
    }

    /// The node record.
    #[inline]
    pub fn vari(&self, id: NodeId) -> &Vari {
        self.nodes.get(id.0)
    }

    /// Operand edges of an n-ary node, empty for other shapes.
    pub fn nary_edges(&self, id: NodeId) -> &[Edge] {
        match self.vari(id).shape {
            Shape::Nary { edges } => self.edges.slice(edges),
            _ => &[],
        }
    }

    /// Tape of this context.
    #[inline]
    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Number of open nested episodes.
    #[inline]
    pub fn nested_depth(&self) -> usize {
        self.nested.len()
    }

    /// Node arena occupancy.
    pub fn node_usage(&self) -> ArenaUsage {
        self.nodes.usage()
    }

    /// Edge arena occupancy.
    pub fn edge_usage(&self) -> ArenaUsage {
        self.edges.usage()
    }

    /// Current tape and memory figures.
    pub fn stats(&self) -> ContextStats {
        let nodes = self.nodes.usage();
        let edges = self.edges.usage();
        ContextStats {
            tape_len: self.tape.len(),
            node_bytes: nodes.used_bytes,
            edge_bytes: edges.used_bytes,
            reserved_bytes: nodes.reserved_bytes + edges.reserved_bytes,
            nested_depth: self.nested.len(),
            sweeps: self.sweeps,
        }
    }

    // =========================================================================
    // Global reset
    // =========================================================================

    /// Releases every node and truncates the tape, keeping reserved blocks.
    ///
    /// # Errors
    ///
    /// Returns `AdError::NestedStillOpen` if any nested episode is open.
    pub fn recover_memory(&mut self) -> AdResult<()> {
        if !self.nested.is_empty() {
            return Err(AdError::NestedStillOpen {
                depth: self.nested.len(),
            });
        }
        let released = self.tape.len();
        self.nodes.reset();
        self.edges.reset();
        self.tape.truncate(0);
        tracing::debug!(released, "context memory recovered");
        Ok(())
    }

    /// Like [`recover_memory`](Self::recover_memory), then returns all
    /// reserved blocks to the system.
    ///
    /// # Errors
    ///
    /// Returns `AdError::NestedStillOpen` if any nested episode is open.
    pub fn free_memory(&mut self) -> AdResult<()> {
        self.recover_memory()?;
        self.nodes.free_unused();
        self.edges.free_unused();
        self.tape.shrink_to_fit();
        Ok(())
    }
}

impl Default for AdContext {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl std::fmt::Debug for AdContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdContext")
            .field("id", &self.id)
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Thread-local worker context
// =============================================================================

fn initial_config() -> ContextConfig {
    match ContextConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring invalid context configuration from environment");
            ContextConfig::default()
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<AdContext> = RefCell::new(AdContext::new(initial_config()));
}

/// Runs `f` with shared access to this thread's context.
///
/// # Panics
///
/// Panics if `f` creates nodes or otherwise needs the context mutably.
pub fn with_context<R>(f: impl FnOnce(&AdContext) -> R) -> R {
    CONTEXT.with(|ctx| f(&*ctx.borrow()))
}

/// Like [`with_context`] but returns `None` instead of panicking when the
/// context is mutably borrowed or already destroyed.
pub(crate) fn try_with_context<R>(f: impl FnOnce(&AdContext) -> R) -> Option<R> {
    CONTEXT
        .try_with(|ctx| ctx.try_borrow().ok().map(|c| f(&*c)))
        .ok()
        .flatten()
}

/// Runs `f` with exclusive access to this thread's context.
pub(crate) fn with_context_mut<R>(f: impl FnOnce(&mut AdContext) -> R) -> R {
    CONTEXT.with(|ctx| f(&mut *ctx.borrow_mut()))
}

/// Like [`with_context_mut`] but tolerates a destroyed thread-local.
pub(crate) fn try_with_context_mut<R>(f: impl FnOnce(&mut AdContext) -> R) -> Option<R> {
    CONTEXT
        .try_with(|ctx| ctx.try_borrow_mut().ok().map(|mut c| f(&mut *c)))
        .ok()
        .flatten()
}

/// Returns tape and memory figures of this thread's context.
pub fn context_stats() -> ContextStats {
    with_context(AdContext::stats)
}

/// Replaces this thread's context configuration.
///
/// # Errors
///
/// Returns `AdError::ContextInUse` unless the context is empty.
pub fn configure(config: ContextConfig) -> AdResult<()> {
    with_context_mut(|ctx| ctx.reconfigure(config))
}

/// Releases every node on this thread, returning to the initial state.
///
/// Handles created before the call must not be used afterwards.
///
/// # Errors
///
/// Returns `AdError::NestedStillOpen` if any nested episode is open.
pub fn recover_memory() -> AdResult<()> {
    with_context_mut(AdContext::recover_memory)
}

/// Like [`recover_memory`] and also returns reserved blocks to the system.
///
/// # Errors
///
/// Returns `AdError::NestedStillOpen` if any nested episode is open.
pub fn free_memory() -> AdResult<()> {
    with_context_mut(AdContext::free_memory)
}

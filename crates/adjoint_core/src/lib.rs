//! # adjoint_core: Reverse-Mode Automatic Differentiation Engine
//!
//! ## Layer 1 (Foundation) Role
//!
//! adjoint_core records elementary operations on tracked scalars and
//! computes exact gradients with a single reverse sweep:
//! - Typed block arena with checkpoint release (`arena`)
//! - Computation nodes as a closed set of shapes (`vari`)
//! - Creation-order tape (`tape`)
//! - Tracked scalar handles with operators and elementary functions (`var`)
//! - Reverse sweep (`sweep`)
//! - Per-worker context and nested episodes (`context`)
//! - Argument checks (`validate`)
//! - Error types: `AdError`, `ConfigError` (`error`)
//!
//! ## Execution Model
//!
//! Each thread owns an independent [`AdContext`] in thread-local storage.
//! [`Var`] handles index that context and are neither `Send` nor `Sync`.
//! Nothing is locked; parallel work runs one context per worker thread.
//!
//! ## Usage Examples
//!
//! ```rust
//! use adjoint_core::{nested, recover_memory, Var};
//!
//! let x = Var::new(3.0);
//! let y = Var::new(4.0);
//! let z = x * x + 3.0 * x * y;
//! z.grad().unwrap();
//! assert_eq!(z.value(), 45.0);
//! assert_eq!(x.adjoint(), 18.0);
//! assert_eq!(y.adjoint(), 9.0);
//!
//! // An inner derivative computed and discarded without touching the
//! // outer tape.
//! let inner = nested(|| {
//!     let t = Var::new(x.value());
//!     let s = t.sin();
//!     s.grad().unwrap();
//!     t.adjoint()
//! });
//! assert!((inner - 3.0f64.cos()).abs() < 1e-15);
//!
//! // Release everything between independent computations.
//! recover_memory().unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialisation for `ContextConfig`, `ContextStats` and `MemoryBudget`

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod arena;
pub mod context;
pub mod error;
pub mod sweep;
pub mod tape;
pub mod validate;
pub mod var;
pub mod vari;

pub use arena::{Arena, ArenaIndex, ArenaMark, ArenaSlice, ArenaUsage, MemoryBudget};
pub use context::{
    configure, context_stats, free_memory, nested, nested_depth, recover_memory,
    recover_nested, start_nested, with_context, AdContext, ContextConfig, ContextConfigBuilder,
    ContextStats, NestedGuard, NestedScope, NestedToken, RecoverError,
};
pub use error::{AdError, AdResult, ConfigError};
pub use sweep::{set_zero_all_adjoints, set_zero_nested_adjoints};
pub use var::{dot, dot_values, log_sum_exp, mean, precomputed_gradients, sum, Var};
pub use vari::{Edge, NodeId, Shape, Vari};

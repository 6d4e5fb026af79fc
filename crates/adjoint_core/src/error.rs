//! Error types for the differentiation engine.
//!
//! This module provides:
//! - `AdError`: every recoverable failure the engine reports
//! - `ConfigError`: validation failures of [`ContextConfig`](crate::ContextConfig)
//! - `AdResult<T>`: result alias used throughout the crate
//!
//! Arena exhaustion surfaces as [`AdError::ArenaExhausted`] only on the
//! fallible arena API. Inside node construction it is fatal and aborts
//! through `std::alloc::handle_alloc_error`.

use crate::arena::ArenaIndex;
use crate::vari::NodeId;
use thiserror::Error;

/// Errors reported by the differentiation engine.
///
/// # Examples
///
/// ```
/// use adjoint_core::AdError;
///
/// let err = AdError::NestedStackEmpty;
/// assert_eq!(format!("{}", err), "recover_nested called with no open nested episode");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdError {
    /// The arena could not grow to satisfy an allocation.
    #[error("arena exhausted: requested {requested} bytes with {used} of {limit} bytes in use")]
    ArenaExhausted {
        /// Size of the failing request in bytes
        requested: usize,
        /// Bytes in use when the request was made
        used: usize,
        /// Budget or system limit that was hit
        limit: usize,
    },

    /// A nested episode was recovered while none was open.
    #[error("recover_nested called with no open nested episode")]
    NestedStackEmpty,

    /// A nested episode other than the innermost one was recovered.
    #[error("nested episode recovered out of order: innermost is depth {innermost}, token is depth {token}")]
    NestedOutOfOrder {
        /// Depth of the innermost open episode
        innermost: usize,
        /// Depth recorded in the token passed to recover
        token: usize,
    },

    /// A nested token was presented to a context that did not issue it.
    #[error("nested token issued by context {issuer} presented to context {context}")]
    ForeignNestedToken {
        /// Context that issued the token
        issuer: u64,
        /// Context the token was presented to
        context: u64,
    },

    /// A global reset was requested while nested episodes were still open.
    #[error("cannot reset engine memory with {depth} nested episode(s) open")]
    NestedStillOpen {
        /// Number of open nested episodes
        depth: usize,
    },

    /// The context was reconfigured after nodes were recorded.
    #[error("context can only be configured while empty ({tape_len} node(s) recorded)")]
    ContextInUse {
        /// Tape length at the time of the request
        tape_len: usize,
    },

    /// A sweep was seeded at a node created before the active nested episode.
    #[error("sweep seed {seed} lies outside the active segment starting at #{segment_start}")]
    SeedOutsideSegment {
        /// The seed node
        seed: NodeId,
        /// First node position of the active segment
        segment_start: ArenaIndex,
    },

    /// An argument failed a domain check before a node was created.
    #[error("{function}: {argument} is {value}, but must be {requirement}")]
    InvalidArgument {
        /// Name of the function performing the check
        function: &'static str,
        /// Name of the offending argument
        argument: &'static str,
        /// Rendered offending value
        value: String,
        /// Human readable requirement
        requirement: String,
    },

    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Validation errors for [`ContextConfig`](crate::ContextConfig).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Block size outside the supported range.
    #[error("block size {0} bytes must be in range [{min}, {max}]", min = crate::context::MIN_BLOCK_BYTES, max = crate::context::MAX_BLOCK_BYTES)]
    InvalidBlockBytes(usize),

    /// Memory budget smaller than one block.
    #[error("memory budget {max_bytes} bytes is smaller than one block ({block_bytes} bytes)")]
    BudgetTooSmall {
        /// Requested budget
        max_bytes: usize,
        /// Configured block size
        block_bytes: usize,
    },

    /// Warning threshold outside [0, 1].
    #[error("warning threshold {0} must be between 0.0 and 1.0")]
    InvalidWarningThreshold(f64),

    /// An environment variable could not be parsed.
    #[error("environment variable {name}={value} is not a valid number")]
    InvalidEnvVar {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Result type for engine operations.
pub type AdResult<T> = Result<T, AdError>;

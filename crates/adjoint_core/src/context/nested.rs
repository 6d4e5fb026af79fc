//! Nested differentiation episodes.
//!
//! A nested episode is a region of tape and arena state that can be swept
//! on its own and then discarded in bulk. Opening one pushes a
//! [`NestedFrame`] holding both arena marks and the tape length; recovering
//! it pops the frame, releases both arenas to their marks and truncates the
//! tape, leaving everything created before the episode untouched.
//!
//! Episodes nest strictly. [`NestedToken`] is neither `Clone` nor `Copy`, so
//! each episode is recovered at most once. Recovering with a token that does
//! not belong to the innermost episode is rejected and the token is handed
//! back in the [`RecoverError`], so the episode can still be closed later.
//!
//! Three forms are provided:
//!
//! - paired calls: [`start_nested`] / [`recover_nested`]
//! - a scoped guard: [`NestedGuard`], recovered on drop
//! - a closure: [`nested`]
//!
//! The guard and closure forms recover on every exit path, including early
//! returns and panics. Sweeps inside an episode may add to the adjoints of
//! nodes created before it; those are reset by the next sweep at the outer
//! level.
//!
//! # Example
//!
//! ```rust
//! use adjoint_core::{context_stats, nested, Var};
//!
//! let outer = Var::new(2.0);
//! let before = context_stats();
//!
//! let inner_grad = nested(|| {
//!     let x = Var::new(outer.value());
//!     let y = x * x * x;
//!     y.grad().unwrap();
//!     x.adjoint()
//! });
//!
//! assert_eq!(inner_grad, 12.0);
//! assert_eq!(context_stats().tape_len, before.tape_len);
//! ```

use super::{try_with_context_mut, with_context, with_context_mut, AdContext, NestedFrame};
use crate::arena::ArenaIndex;
use crate::error::AdError;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Proof of an open nested episode, consumed when it is recovered.
#[must_use = "a nested episode must be recovered with its token"]
#[derive(Debug, PartialEq, Eq)]
pub struct NestedToken {
    context: u64,
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl NestedToken {
    /// Depth of the episode, 1 for the outermost.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// A rejected [`recover_nested`](AdContext::recover_nested), carrying the
/// token back to the caller.
///
/// # Example
///
/// ```rust
/// use adjoint_core::{nested_depth, recover_nested, start_nested, AdError};
///
/// let outer = start_nested();
/// let inner = start_nested();
///
/// let err = recover_nested(outer).unwrap_err();
/// assert!(matches!(err.error(), AdError::NestedOutOfOrder { .. }));
///
/// let outer = err.into_token();
/// recover_nested(inner).unwrap();
/// recover_nested(outer).unwrap();
/// assert_eq!(nested_depth(), 0);
/// ```
#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct RecoverError {
    error: AdError,
    token: NestedToken,
}

impl RecoverError {
    /// Reason the episode was not recovered.
    #[inline]
    pub fn error(&self) -> &AdError {
        &self.error
    }

    /// Returns the token, which still identifies its episode.
    #[inline]
    pub fn into_token(self) -> NestedToken {
        self.token
    }

    /// Splits into the reason and the token.
    #[inline]
    pub fn into_parts(self) -> (AdError, NestedToken) {
        (self.error, self.token)
    }
}

impl From<RecoverError> for AdError {
    fn from(err: RecoverError) -> Self {
        err.error
    }
}

impl AdContext {
    /// Opens a nested episode.
    pub fn start_nested(&mut self) -> NestedToken {
        self.nested.push(NestedFrame {
            nodes: self.nodes.mark(),
            edges: self.edges.mark(),
            tape_len: self.tape.len(),
        });
        let depth = self.nested.len();
        tracing::trace!(depth, tape_len = self.tape.len(), "nested episode started");
        NestedToken {
            context: self.id,
            depth,
            _not_send: PhantomData,
        }
    }

    /// Closes the innermost nested episode and discards everything created
    /// inside it.
    ///
    /// # Errors
    ///
    /// - `AdError::ForeignNestedToken` if another context issued the token
    /// - `AdError::NestedStackEmpty` if no episode is open
    /// - `AdError::NestedOutOfOrder` if the token is not the innermost one
    ///
    /// On error no state is changed and the token is returned inside the
    /// [`RecoverError`].
    pub fn recover_nested(&mut self, token: NestedToken) -> Result<(), RecoverError> {
        let innermost = self.nested.len();
        let error = if token.context != self.id {
            AdError::ForeignNestedToken {
                issuer: token.context,
                context: self.id,
            }
        } else if innermost == 0 {
            AdError::NestedStackEmpty
        } else if token.depth != innermost {
            AdError::NestedOutOfOrder {
                innermost,
                token: token.depth,
            }
        } else {
            self.release_through(innermost);
            return Ok(());
        };
        Err(RecoverError { error, token })
    }

    /// Recovers the episode of `token` together with every episode opened
    /// inside it.
    ///
    /// Used when a scope ends while inner episodes are still open. Misuse is
    /// still reported, but the stack is left consistent.
    pub(crate) fn abandon_nested(&mut self, token: NestedToken) -> Result<(), AdError> {
        match self.recover_nested(token) {
            Ok(()) => Ok(()),
            Err(err) => {
                let (error, token) = err.into_parts();
                if let AdError::NestedOutOfOrder { innermost, .. } = error {
                    if token.depth < innermost {
                        self.release_through(token.depth);
                    }
                }
                Err(error)
            }
        }
    }

    /// Pops every frame at or above `depth` and rewinds to the oldest one.
    fn release_through(&mut self, depth: usize) {
        let innermost = self.nested.len();
        let Some(&frame) = depth.checked_sub(1).and_then(|i| self.nested.get(i)) else {
            return;
        };
        self.nested.truncate(depth - 1);
        let discarded = self.tape.len() - frame.tape_len;
        self.nodes.release(frame.nodes);
        self.edges.release(frame.edges);
        self.tape.truncate(frame.tape_len);
        if innermost == depth {
            tracing::trace!(depth, discarded, "nested episode recovered");
        } else {
            tracing::warn!(
                depth,
                innermost,
                discarded,
                "nested episode recovered with inner episodes still open"
            );
        }
    }

    /// Opens a nested episode recovered when the returned scope drops.
    pub fn nested_scope(&mut self) -> NestedScope<'_> {
        let token = self.start_nested();
        NestedScope {
            ctx: self,
            token: Some(token),
        }
    }

    /// Runs `f` inside a nested episode of this context.
    pub fn nested_with<R>(&mut self, f: impl FnOnce(&mut AdContext) -> R) -> R {
        let mut scope = self.nested_scope();
        let out = f(&mut scope);
        drop(scope);
        out
    }

    /// Tape position and node arena boundary of the active segment.
    pub(crate) fn segment_start(&self) -> (usize, ArenaIndex) {
        match self.nested.last() {
            Some(frame) => (frame.tape_len, frame.nodes.boundary()),
            None => (0, crate::arena::ArenaMark::START.boundary()),
        }
    }
}

fn report_guard_failure(err: AdError) {
    tracing::error!(error = %err, "nested episode guard failed to recover");
    if !std::thread::panicking() {
        panic!("nested episode guard failed to recover: {err}");
    }
}

/// Nested episode over an explicit [`AdContext`], recovered on drop.
///
/// Dereferences to the context so operations recorded through it land in
/// the episode.
#[derive(Debug)]
pub struct NestedScope<'a> {
    ctx: &'a mut AdContext,
    token: Option<NestedToken>,
}

impl Deref for NestedScope<'_> {
    type Target = AdContext;

    fn deref(&self) -> &AdContext {
        &*self.ctx
    }
}

impl DerefMut for NestedScope<'_> {
    fn deref_mut(&mut self) -> &mut AdContext {
        &mut *self.ctx
    }
}

impl Drop for NestedScope<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(err) = self.ctx.abandon_nested(token) {
                report_guard_failure(err);
            }
        }
    }
}

// =============================================================================
// Thread-local API
// =============================================================================

/// Opens a nested episode on this thread's context.
pub fn start_nested() -> NestedToken {
    with_context_mut(AdContext::start_nested)
}

/// Closes the innermost nested episode on this thread's context.
///
/// Handles created inside the episode must not be used afterwards.
///
/// # Errors
///
/// See [`AdContext::recover_nested`].
pub fn recover_nested(token: NestedToken) -> Result<(), RecoverError> {
    with_context_mut(|ctx| ctx.recover_nested(token))
}

/// Number of open nested episodes on this thread.
pub fn nested_depth() -> usize {
    with_context(AdContext::nested_depth)
}

/// Scoped nested episode on this thread's context.
///
/// The episode is recovered when the guard is dropped or on
/// [`finish`](Self::finish). Dropping a guard that is not the innermost
/// episode recovers it along with the episodes opened inside it, reports
/// the misuse with `tracing::error!` and panics unless the thread is
/// already unwinding.
///
/// # Example
///
/// ```rust
/// use adjoint_core::{nested_depth, NestedGuard, Var};
///
/// fn inner_work() -> Result<f64, adjoint_core::AdError> {
///     let _guard = NestedGuard::new();
///     let x = Var::new(1.5);
///     let y = x.exp();
///     y.grad()?;
///     Ok(x.adjoint())
/// }
///
/// let d = inner_work().unwrap();
/// assert!((d - 1.5f64.exp()).abs() < 1e-12);
/// assert_eq!(nested_depth(), 0);
/// ```
#[derive(Debug)]
pub struct NestedGuard {
    token: Option<NestedToken>,
}

impl NestedGuard {
    /// Opens a nested episode.
    pub fn new() -> Self {
        Self {
            token: Some(start_nested()),
        }
    }

    /// Depth of the guarded episode.
    pub fn depth(&self) -> usize {
        self.token.as_ref().map_or(0, NestedToken::depth)
    }

    /// Recovers the episode now, reporting misuse as an error.
    ///
    /// # Errors
    ///
    /// See [`AdContext::recover_nested`]. The guard is handed back with the
    /// error and still owns its episode.
    pub fn finish(mut self) -> Result<(), (AdError, NestedGuard)> {
        match self.token.take() {
            Some(token) => recover_nested(token).map_err(|err| {
                let (error, token) = err.into_parts();
                (error, NestedGuard { token: Some(token) })
            }),
            None => Ok(()),
        }
    }
}

impl Default for NestedGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NestedGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            match try_with_context_mut(|ctx| ctx.abandon_nested(token)) {
                Some(Ok(())) => {}
                Some(Err(err)) => report_guard_failure(err),
                None => tracing::error!("nested episode guard dropped without an accessible context"),
            }
        }
    }
}

/// Runs `f` inside a nested episode on this thread's context.
///
/// The episode is recovered after `f` returns or panics.
pub fn nested<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let guard = NestedGuard::new();
    let out = f();
    drop(guard);
    out
}

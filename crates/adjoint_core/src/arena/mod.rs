//! Block arena for bump allocation with bulk release.
//!
//! An [`Arena`] is a growable sequence of fixed-capacity blocks. Values are
//! appended to the current block in O(1); when it fills up the arena moves
//! to the next block, reusing a retained one or reserving a new one. There is
//! no per-allocation free. Instead [`Arena::mark`] captures the occupancy and
//! [`Arena::release`] rewinds to it, making everything allocated after the
//! mark available again.
//!
//! Allocations are addressed by [`ArenaIndex`] and [`ArenaSlice`] rather than
//! references, so callers hold no borrow of the arena between operations.
//! An index obtained after a mark must not be used once that mark has been
//! released; the arena does not detect such stale use and may return a value
//! written by a later allocation.
//!
//! # Example
//!
//! ```rust
//! use adjoint_core::arena::Arena;
//!
//! let mut arena: Arena<f64> = Arena::with_block_bytes(1024);
//! let a = arena.alloc(1.5);
//!
//! let mark = arena.mark();
//! let scratch = arena.alloc_slice(&[2.0, 3.0, 4.0]);
//! assert_eq!(arena.slice(scratch), &[2.0, 3.0, 4.0]);
//!
//! arena.release(mark);
//! assert_eq!(*arena.get(a), 1.5);
//! assert_eq!(arena.usage().used_bytes, std::mem::size_of::<f64>());
//! ```

mod budget;

pub use budget::MemoryBudget;

use crate::error::{AdError, AdResult};
use std::fmt;
use std::mem;

/// Default block size in bytes (64 KiB).
pub const DEFAULT_BLOCK_BYTES: usize = 64 * 1024;

/// Location of one value in an [`Arena`].
///
/// Ordering follows allocation order for indices that are live at the same
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaIndex {
    block: u32,
    offset: u32,
}

impl ArenaIndex {
    /// Block number holding the value.
    #[inline]
    pub fn block(&self) -> usize {
        self.block as usize
    }

    /// Offset within the block.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}

impl fmt::Display for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block, self.offset)
    }
}

/// Contiguous run of values in a single arena block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaSlice {
    start: ArenaIndex,
    len: u32,
}

impl ArenaSlice {
    /// The empty slice. Never touches arena storage.
    pub const EMPTY: ArenaSlice = ArenaSlice {
        start: ArenaIndex {
            block: 0,
            offset: 0,
        },
        len: 0,
    };

    /// Number of values in the slice.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the slice is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Snapshot of arena occupancy, produced by [`Arena::mark`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaMark {
    block: usize,
    offset: usize,
    used: usize,
}

impl ArenaMark {
    /// Mark of an arena with nothing allocated.
    pub const START: ArenaMark = ArenaMark {
        block: 0,
        offset: 0,
        used: 0,
    };

    /// First index allocated after this mark, if the allocation lands in the
    /// marked block. Any index at or after it was allocated after the mark.
    #[inline]
    pub fn boundary(&self) -> ArenaIndex {
        ArenaIndex {
            block: self.block as u32,
            offset: self.offset as u32,
        }
    }

    /// Number of values allocated when the mark was taken.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }
}

/// Occupancy report for an arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArenaUsage {
    /// Bytes occupied by live allocations.
    pub used_bytes: usize,
    /// Bytes reserved from the system across all blocks.
    pub reserved_bytes: usize,
    /// Number of blocks, including retained empty ones.
    pub blocks: usize,
}

/// Typed block arena with O(1) bump allocation and checkpoint release.
///
/// # Type Parameters
///
/// * `T` - Stored value type. `Copy` so that release never needs to run
///   destructors.
pub struct Arena<T: Copy> {
    /// Blocks in allocation order. Blocks after `current` are retained empty.
    blocks: Vec<Vec<T>>,
    /// Block receiving new allocations.
    current: usize,
    /// Element capacity of a regular block.
    block_len: usize,
    /// Live values across all blocks.
    used: usize,
    /// Bytes reserved across all blocks.
    reserved: usize,
    /// Optional cap on reserved bytes.
    budget: Option<MemoryBudget>,
    /// Whether the budget warning has been emitted since the last drop below it.
    warned: bool,
}

impl<T: Copy> Arena<T> {
    /// Creates an arena whose regular blocks hold `block_bytes` bytes.
    ///
    /// No memory is reserved until the first allocation.
    pub fn with_block_bytes(block_bytes: usize) -> Self {
        let block_len = (block_bytes / mem::size_of::<T>().max(1)).max(1);
        Self {
            blocks: Vec::new(),
            current: 0,
            block_len,
            used: 0,
            reserved: 0,
            budget: None,
            warned: false,
        }
    }

    /// Sets a memory budget capping the bytes this arena may reserve.
    pub fn with_budget(mut self, budget: MemoryBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Returns the memory budget if set.
    pub fn budget(&self) -> Option<&MemoryBudget> {
        self.budget.as_ref()
    }

    /// Element capacity of a regular block.
    #[inline]
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    /// Whether nothing is allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Allocates one value.
    ///
    /// # Errors
    ///
    /// Returns `AdError::ArenaExhausted` if a new block is needed and either
    /// the budget or the system refuses it.
    pub fn try_alloc(&mut self, value: T) -> AdResult<ArenaIndex> {
        if !self.current_fits(1) {
            self.advance(1)?;
        }
        let block = &mut self.blocks[self.current];
        let offset = block.len();
        block.push(value);
        self.used += 1;
        Ok(ArenaIndex {
            block: self.current as u32,
            offset: offset as u32,
        })
    }

    /// Allocates a copy of `values` contiguously in one block.
    ///
    /// # Errors
    ///
    /// Same as [`try_alloc`](Self::try_alloc).
    pub fn try_alloc_slice(&mut self, values: &[T]) -> AdResult<ArenaSlice> {
        if values.is_empty() {
            return Ok(ArenaSlice::EMPTY);
        }
        let n = values.len();
        if !self.current_fits(n) {
            self.advance(n)?;
        }
        let block = &mut self.blocks[self.current];
        let offset = block.len();
        block.extend_from_slice(values);
        self.used += n;
        Ok(ArenaSlice {
            start: ArenaIndex {
                block: self.current as u32,
                offset: offset as u32,
            },
            len: n as u32,
        })
    }

    /// Allocates one value, treating exhaustion as fatal.
    ///
    /// # Panics
    ///
    /// Panics with the exhaustion report if the arena cannot grow.
    pub fn alloc(&mut self, value: T) -> ArenaIndex {
        match self.try_alloc(value) {
            Ok(index) => index,
            Err(err) => panic!("{err}"),
        }
    }

    /// Allocates a slice, treating exhaustion as fatal.
    ///
    /// # Panics
    ///
    /// Panics with the exhaustion report if the arena cannot grow.
    pub fn alloc_slice(&mut self, values: &[T]) -> ArenaSlice {
        match self.try_alloc_slice(values) {
            Ok(slice) => slice,
            Err(err) => panic!("{err}"),
        }
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` points past the live region of its block.
    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &T {
        &self.blocks[index.block()][index.offset()]
    }

    /// Returns the value at `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index` points past the live region of its block.
    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut T {
        &mut self.blocks[index.block()][index.offset()]
    }

    /// Returns the values of `slice`.
    #[inline]
    pub fn slice(&self, slice: ArenaSlice) -> &[T] {
        if slice.is_empty() {
            return &[];
        }
        let start = slice.start.offset();
        &self.blocks[slice.start.block()][start..start + slice.len()]
    }

    /// Captures the current occupancy.
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            block: self.current,
            offset: self.blocks.get(self.current).map_or(0, Vec::len),
            used: self.used,
        }
    }

    /// Rewinds occupancy to `mark`.
    ///
    /// Blocks emptied by the release stay reserved for reuse. A mark taken
    /// after the current occupancy is ignored.
    pub fn release(&mut self, mark: ArenaMark) {
        if mark.used > self.used {
            return;
        }
        if self.blocks.is_empty() {
            self.current = 0;
            self.used = 0;
            return;
        }
        for block in self.blocks[mark.block + 1..=self.current].iter_mut() {
            block.clear();
        }
        self.blocks[mark.block].truncate(mark.offset);
        self.current = mark.block;
        self.used = mark.used;
    }

    /// Releases every allocation. Blocks stay reserved.
    pub fn reset(&mut self) {
        self.release(ArenaMark::START);
    }

    /// Returns retained empty blocks to the system.
    pub fn free_unused(&mut self) {
        let keep = if self.used == 0 { 0 } else { self.current + 1 };
        self.blocks.truncate(keep);
        if keep == 0 {
            self.current = 0;
        }
        self.reserved = self
            .blocks
            .iter()
            .map(|b| b.capacity() * mem::size_of::<T>())
            .sum();
        if let Some(budget) = &self.budget {
            if !budget.is_warning(self.reserved) {
                self.warned = false;
            }
        }
        tracing::debug!(
            blocks = self.blocks.len(),
            reserved_bytes = self.reserved,
            "arena returned unused blocks"
        );
    }

    /// Reports current occupancy.
    pub fn usage(&self) -> ArenaUsage {
        ArenaUsage {
            used_bytes: self.used * mem::size_of::<T>(),
            reserved_bytes: self.reserved,
            blocks: self.blocks.len(),
        }
    }

    fn current_fits(&self, n: usize) -> bool {
        self.blocks
            .get(self.current)
            .is_some_and(|b| b.capacity() - b.len() >= n)
    }

    /// Moves `current` to a block able to hold `n` values.
    fn advance(&mut self, n: usize) -> AdResult<()> {
        let next = if self.blocks.is_empty() {
            0
        } else if self.blocks[self.current].is_empty() {
            // An empty current block that is too small is replaced in place.
            self.current
        } else {
            self.current + 1
        };

        if self.blocks.get(next).is_some_and(|b| b.capacity() >= n) {
            self.current = next;
            return Ok(());
        }

        let capacity = self.block_len.max(n);
        let bytes = capacity * mem::size_of::<T>();
        if let Some(budget) = &self.budget {
            if !budget.is_within_budget(self.reserved + bytes) {
                return Err(AdError::ArenaExhausted {
                    requested: bytes,
                    used: self.reserved,
                    limit: budget.max_bytes(),
                });
            }
        }

        let mut block = Vec::new();
        block
            .try_reserve_exact(capacity)
            .map_err(|_| AdError::ArenaExhausted {
                requested: bytes,
                used: self.reserved,
                limit: self.reserved,
            })?;
        self.reserved += block.capacity() * mem::size_of::<T>();
        self.blocks.insert(next, block);
        self.current = next;

        tracing::debug!(
            block = next,
            capacity,
            reserved_bytes = self.reserved,
            "arena reserved block"
        );
        self.check_warning();
        Ok(())
    }

    fn check_warning(&mut self) {
        if let Some(budget) = &self.budget {
            if budget.is_warning(self.reserved) && !self.warned {
                self.warned = true;
                tracing::warn!(
                    reserved_bytes = self.reserved,
                    max_bytes = budget.max_bytes(),
                    "arena crossed memory budget warning threshold"
                );
            }
        }
    }
}

impl<T: Copy> Default for Arena<T> {
    fn default() -> Self {
        Self::with_block_bytes(DEFAULT_BLOCK_BYTES)
    }
}

impl<T: Copy> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("block_len", &self.block_len)
            .field("current", &self.current)
            .field("usage", &self.usage())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> Arena<u64> {
        // 4 values per block
        Arena::with_block_bytes(4 * mem::size_of::<u64>())
    }

    #[test]
    fn test_arena_starts_empty_without_reserving() {
        let arena = small_arena();
        assert_eq!(arena.usage(), ArenaUsage::default());
        assert_eq!(arena.block_len(), 4);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_alloc_and_get() {
        let mut arena = small_arena();
        let indices: Vec<_> = (0..10).map(|i| arena.alloc(i)).collect();
        for (i, idx) in indices.iter().enumerate() {
            assert_eq!(*arena.get(*idx), i as u64);
        }
        assert_eq!(arena.len(), 10);
        assert_eq!(arena.usage().blocks, 3);
    }

    #[test]
    fn test_arena_indices_follow_allocation_order() {
        let mut arena = small_arena();
        let indices: Vec<_> = (0..9).map(|i| arena.alloc(i)).collect();
        for pair in indices.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_arena_slice_never_straddles_blocks() {
        let mut arena = small_arena();
        arena.alloc(1);
        arena.alloc(2);
        arena.alloc(3);
        let s = arena.alloc_slice(&[10, 11]);
        assert_eq!(arena.slice(s), &[10, 11]);
        assert_eq!(s.start.block(), 1);
    }

    #[test]
    fn test_arena_oversize_slice_gets_dedicated_block() {
        let mut arena = small_arena();
        let values: Vec<u64> = (0..9).collect();
        let s = arena.alloc_slice(&values);
        assert_eq!(arena.slice(s), values.as_slice());
        assert!(arena.usage().reserved_bytes >= 9 * mem::size_of::<u64>());
    }

    #[test]
    fn test_arena_empty_slice_does_not_allocate() {
        let mut arena = small_arena();
        let s = arena.alloc_slice(&[]);
        assert!(s.is_empty());
        assert!(arena.slice(s).is_empty());
        assert_eq!(arena.usage().blocks, 0);
    }

    #[test]
    fn test_arena_release_restores_mark() {
        let mut arena = small_arena();
        let keep = arena.alloc(7);
        arena.alloc(8);
        let mark = arena.mark();
        let before = arena.usage();

        for i in 0..20 {
            arena.alloc(100 + i);
        }
        arena.alloc_slice(&[1, 2, 3]);
        arena.release(mark);

        assert_eq!(arena.usage().used_bytes, before.used_bytes);
        assert_eq!(*arena.get(keep), 7);
        assert_eq!(arena.mark(), mark);
    }

    #[test]
    fn test_arena_release_reuses_blocks() {
        let mut arena = small_arena();
        let mark = arena.mark();
        for i in 0..16 {
            arena.alloc(i);
        }
        let reserved = arena.usage().reserved_bytes;
        arena.release(mark);
        for i in 0..16 {
            arena.alloc(i);
        }
        assert_eq!(arena.usage().reserved_bytes, reserved);
    }

    #[test]
    fn test_arena_release_future_mark_is_ignored() {
        let mut arena = small_arena();
        arena.alloc(1);
        let mark = arena.mark();
        arena.alloc(2);
        let later = arena.mark();
        arena.release(mark);
        arena.release(later);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_arena_reset_and_free_unused() {
        let mut arena = small_arena();
        for i in 0..12 {
            arena.alloc(i);
        }
        arena.reset();
        assert_eq!(arena.usage().used_bytes, 0);
        assert!(arena.usage().reserved_bytes > 0);

        arena.free_unused();
        assert_eq!(arena.usage(), ArenaUsage::default());

        let idx = arena.alloc(42);
        assert_eq!(*arena.get(idx), 42);
    }

    #[test]
    fn test_arena_budget_exhaustion() {
        let block_bytes = 4 * mem::size_of::<u64>();
        let mut arena = small_arena().with_budget(MemoryBudget::new(2 * block_bytes));
        for i in 0..8 {
            arena.try_alloc(i).unwrap();
        }
        let err = arena.try_alloc(9).unwrap_err();
        assert!(matches!(err, AdError::ArenaExhausted { .. }));
        // Existing allocations are untouched
        assert_eq!(arena.len(), 8);
    }

    #[test]
    fn test_arena_budget_warns_once_until_below_threshold() {
        let block_bytes = 4 * mem::size_of::<u64>();
        let budget = MemoryBudget::new(4 * block_bytes).with_warning_threshold(0.5);
        let mut arena = small_arena().with_budget(budget);

        // Two blocks sit exactly at the threshold
        for i in 0..8 {
            arena.alloc(i);
        }
        assert!(!arena.warned);

        // Third block crosses it
        arena.alloc(8);
        assert!(arena.warned);

        // Fourth block stays above it without re-arming
        for i in 9..16 {
            arena.alloc(i);
        }
        assert_eq!(arena.usage().blocks, 4);
        assert!(arena.warned);

        // Dropping back below re-arms the warning
        arena.reset();
        arena.free_unused();
        assert!(!arena.warned);

        for i in 0..9 {
            arena.alloc(i);
        }
        assert!(arena.warned);
    }

    #[test]
    fn test_arena_release_alone_keeps_warning_state() {
        let block_bytes = 4 * mem::size_of::<u64>();
        let budget = MemoryBudget::new(4 * block_bytes).with_warning_threshold(0.5);
        let mut arena = small_arena().with_budget(budget);
        for i in 0..12 {
            arena.alloc(i);
        }
        assert!(arena.warned);
        // Retained blocks stay reserved, so the arena is still above the threshold
        arena.reset();
        assert!(arena.warned);
    }

    #[test]
    #[should_panic(expected = "arena exhausted")]
    fn test_arena_alloc_panics_on_exhaustion() {
        let mut arena = small_arena().with_budget(MemoryBudget::new(8));
        arena.alloc(1);
    }

    #[test]
    fn test_arena_get_mut() {
        let mut arena = small_arena();
        let idx = arena.alloc(1);
        *arena.get_mut(idx) += 41;
        assert_eq!(*arena.get(idx), 42);
    }
}

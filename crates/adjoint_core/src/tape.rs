//! Creation-order record of nodes.
//!
//! Every node is appended when it is created and the tape is never
//! reordered. Since a node can only reference handles that already exist,
//! the entry at position `i` depends only on entries before `i`, and walking
//! a suffix of the tape backwards visits each node after all of its
//! consumers.

use crate::vari::NodeId;

/// Append-only sequence of node ids in creation order.
#[derive(Clone, Debug, Default)]
pub struct Tape {
    entries: Vec<NodeId>,
}

impl Tape {
    /// Creates an empty tape with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends a node.
    #[inline]
    pub fn push(&mut self, id: NodeId) {
        self.entries.push(id);
    }

    /// Number of recorded nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tape is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry at or after `len`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Entries from `start` to the end, in creation order.
    #[inline]
    pub fn segment(&self, start: usize) -> &[NodeId] {
        &self.entries[start.min(self.entries.len())..]
    }

    /// Entry at `position`.
    #[inline]
    pub fn get(&self, position: usize) -> Option<NodeId> {
        self.entries.get(position).copied()
    }

    /// Releases spare capacity.
    pub fn shrink_to_fit(&mut self) {
        self.entries.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::vari::Vari;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut nodes: Arena<Vari> = Arena::with_block_bytes(256);
        (0..n)
            .map(|i| NodeId(nodes.alloc(Vari::leaf(i as f64))))
            .collect()
    }

    #[test]
    fn test_tape_push_and_segment() {
        let ids = ids(5);
        let mut tape = Tape::with_capacity(8);
        for id in &ids {
            tape.push(*id);
        }
        assert_eq!(tape.len(), 5);
        assert_eq!(tape.segment(3), &ids[3..]);
        assert_eq!(tape.get(0), Some(ids[0]));
        assert!(tape.segment(10).is_empty());
    }

    #[test]
    fn test_tape_truncate() {
        let ids = ids(4);
        let mut tape = Tape::default();
        for id in &ids {
            tape.push(*id);
        }
        tape.truncate(1);
        assert_eq!(tape.len(), 1);
        assert_eq!(tape.get(1), None);
        tape.truncate(0);
        assert!(tape.is_empty());
    }
}

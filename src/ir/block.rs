//! Basic blocks: labeled, ordered instruction sequences.
//!
//! A block owns nothing but handles - the instructions themselves live in the
//! function's arena. This keeps insertion during traversal cheap and safe:
//! a pass snapshots the handle list, then inserts freely without invalidating
//! anything it still intends to visit.
//!
//! # Invariants
//!
//! In a well-formed function (see [`crate::ir::Module::verify`]) every block
//! is non-empty, ends in exactly one terminator, and keeps its phi nodes as a
//! leading prefix.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync`.

use std::fmt;

use crate::ir::instruction::InstrId;

/// An opaque handle to a basic block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a block handle from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A basic block: a label plus an ordered list of instruction handles.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    id: BlockId,
    label: String,
    instrs: Vec<InstrId>,
}

impl BasicBlock {
    /// Creates a new empty block.
    #[must_use]
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instrs: Vec::new(),
        }
    }

    /// Returns the block handle.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the instruction handles in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[InstrId] {
        &self.instrs
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Returns the handle of the last instruction, if any.
    #[must_use]
    pub fn last(&self) -> Option<InstrId> {
        self.instrs.last().copied()
    }

    /// Returns the position of an instruction within this block.
    #[must_use]
    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        self.instrs.iter().position(|&i| i == id)
    }

    /// Returns `true` if this block contains the instruction.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        self.instrs.contains(&id)
    }

    /// Appends an instruction handle.
    pub fn push(&mut self, id: InstrId) {
        self.instrs.push(id);
    }

    /// Inserts an instruction handle at the given position.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, id: InstrId) {
        self.instrs.insert(index, id);
    }

    /// Removes an instruction handle, preserving order.
    ///
    /// Returns `true` if the handle was present.
    pub fn remove(&mut self, id: InstrId) -> bool {
        match self.position_of(id) {
            Some(index) => {
                self.instrs.remove(index);
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} instrs)", self.label, self.instrs.len())
    }
}

//! Per-frame SSA intermediate representation.
//!
//! This is the graph PEA consumes: basic blocks with phi nodes, a flat
//! instruction vector per block, and predecessor links. It intentionally
//! models only what §6 of the design doc calls "consumed services" — the
//! bytecode loader, the real object model, the garbage collector, and the
//! JIT back-end that build and read this graph are out of scope here.

mod blocks;
mod instructions;
mod rpo;
mod types;

pub use blocks::*;
pub use instructions::*;
pub use rpo::*;
pub use types::*;

use std::fmt;

/// Unique identifier for an SSA register (original, i.e. pre-renumbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(u32);

impl RegId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A stable type-table slot. Identifies an opaque object's shape the way the
/// real object model would via its stable handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StableId(pub u32);

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stable{}", self.0)
    }
}

/// A concrete deopt index, distinguished from a synthetic one used only to
/// mark synthetic registers live (see `spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeoptIndex {
    Concrete(u32),
    Synthetic(u32),
}

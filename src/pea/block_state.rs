//! Per-basic-block analysis state (`spec.md` §3 "Per-basic-block state").

use super::allocation::AllocIndex;
use super::transform::{MaterializationId, Transform};
use std::collections::BTreeMap;

/// Per-allocation state as seen at one point in the analysis (a block's
/// entry, or its exit after all instructions have been visited).
#[derive(Debug, Clone)]
pub struct AllocState {
    /// This allocation was definitely visible by the time we reached here.
    pub seen: bool,
    /// `used[i]` — attribute `i` has been written on every path reaching
    /// this point. A merge-intersection bitmap (`spec.md` §4.3).
    pub used: Vec<bool>,
    /// Materializations active here; more than one entry arises when
    /// sibling predecessors each materialized independently.
    pub materializations: Vec<MaterializationId>,
}

impl AllocState {
    pub fn new(attr_count: usize) -> Self {
        Self {
            seen: false,
            used: vec![false; attr_count],
            materializations: Vec::new(),
        }
    }
}

/// The ordered plan and per-allocation state for one basic block.
/// Uses a `BTreeMap` keyed by allocation index for deterministic iteration,
/// the same convention `scalar_replacement.rs` applies throughout.
#[derive(Debug, Default)]
pub struct BlockState {
    pub transformations: Vec<Transform>,
    pub alloc_states: BTreeMap<AllocIndex, AllocState>,
}

impl BlockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_state(&mut self, alloc: AllocIndex, attr_count: usize) -> &mut AllocState {
        self.alloc_states
            .entry(alloc)
            .or_insert_with(|| AllocState::new(attr_count))
    }

    pub fn push(&mut self, transform: Transform) {
        self.transformations.push(transform);
    }
}

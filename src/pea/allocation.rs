//! Allocation records and the tracker that creates them.
//!
//! Grounded on the teacher's `AllocationTracker`
//! (`semantic_graph/analysis/escape_analyzer.rs`) for the shape of a tracked
//! record, and on `scalar_replacement.rs`'s `SraCandidate` for the
//! dense-index-into-a-per-pass-vector identity convention.

use crate::ir::{BlockId, StableId};
use crate::object_model::ObjectModel;

/// A monotonically assigned 16-bit placeholder for an attribute register.
/// Symbolic until the Transformer's `delete-fastcreate` handler resolves it
/// to a concrete `RegId` (`spec.md` §3 "Hypothetical registers").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HypotheticalReg(pub u16);

/// Dense index of an `Allocation` in `AllocationTracker::allocations`. Used
/// everywhere as the allocation's identity, per `spec.md` §3.
pub type AllocIndex = usize;

#[derive(Debug, Clone)]
pub struct Allocation {
    pub index: AllocIndex,
    pub origin_block: BlockId,
    pub origin_instruction: usize,
    pub stable: StableId,
    /// One hypothetical register per attribute, in attribute-offset order.
    pub attr_regs: Vec<HypotheticalReg>,
    pub bigint: bool,
    pub bigint_attr_index: Option<usize>,
    pub read: bool,
    pub irreplaceable: bool,
    pub deopt_info: Option<usize>,
    pub escape_dependencies: Vec<AllocIndex>,
}

impl Allocation {
    pub fn attr_count(&self) -> usize {
        self.attr_regs.len()
    }
}

#[derive(Debug, Default)]
pub struct AllocationTracker {
    pub allocations: Vec<Allocation>,
    next_hypothetical: u32,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a standalone hypothetical register not tied to a new
    /// `Allocation` — used by big-integer decomposition (`spec.md` §4.4)
    /// when an operand doesn't alias a tracked allocation and instead needs
    /// a fallback `get-bigint` load recorded against its attribute offset.
    pub fn alloc_hypothetical(&mut self) -> HypotheticalReg {
        let reg = HypotheticalReg(self.next_hypothetical as u16);
        self.next_hypothetical += 1;
        reg
    }

    fn fresh_hyp_regs(&mut self, count: usize) -> Vec<HypotheticalReg> {
        let mut regs = Vec::with_capacity(count);
        for _ in 0..count {
            regs.push(HypotheticalReg(self.next_hypothetical as u16));
            self.next_hypothetical += 1;
        }
        regs
    }

    /// `try_track(bb, ins, stable)` of `spec.md` §4.1. Returns the new
    /// allocation's dense index iff `stable` names a transparent opaque
    /// record whose every attribute is one of the handled storage kinds.
    /// Since `AttrKind` models exactly that handled set, the only rejection
    /// condition is the object model reporting no opaque shape at all.
    pub fn try_track(
        &mut self,
        model: &dyn ObjectModel,
        origin_block: BlockId,
        origin_instruction: usize,
        stable: StableId,
    ) -> Option<AllocIndex> {
        let shape = model.opaque_shape(stable)?;
        let attr_regs = self.fresh_hyp_regs(shape.attr_count);
        let index = self.allocations.len();
        self.allocations.push(Allocation {
            index,
            origin_block,
            origin_instruction,
            stable,
            attr_regs,
            bigint: shape.bigint_attr.is_some(),
            bigint_attr_index: shape.bigint_attr,
            read: false,
            irreplaceable: false,
            deopt_info: None,
            escape_dependencies: Vec::new(),
        });
        Some(index)
    }

    pub fn get(&self, index: AllocIndex) -> &Allocation {
        &self.allocations[index]
    }

    pub fn get_mut(&mut self, index: AllocIndex) -> &mut Allocation {
        &mut self.allocations[index]
    }

    /// Sets `irreplaceable` on `root` and transitively on every allocation
    /// that `root` depends on via `escape_dependencies`, flood-fill style
    /// (`spec.md` §3 invariant, §9 "Cyclic/shared ownership across
    /// allocations" — modeled as a DAG since the pass aborts on CFG loops).
    pub fn mark_irreplaceable(&mut self, root: AllocIndex) {
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let alloc = &mut self.allocations[idx];
            if alloc.irreplaceable {
                continue;
            }
            alloc.irreplaceable = true;
            stack.extend(alloc.escape_dependencies.clone());
        }
    }

    pub fn is_irreplaceable(&self, index: AllocIndex) -> bool {
        self.allocations[index].irreplaceable
    }

    /// Records that `from` holds an escape dependency on `to`: if `from`
    /// ever becomes irreplaceable, `to` must as well.
    pub fn add_escape_dependency(&mut self, from: AllocIndex, to: AllocIndex) {
        let deps = &mut self.allocations[from].escape_dependencies;
        if !deps.contains(&to) {
            deps.push(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::AttrKind;
    use crate::object_model::FakeObjectModel;

    #[test]
    fn try_track_assigns_one_hyp_reg_per_attribute() {
        let model = FakeObjectModel::new()
            .with_flat_record(StableId(1), &[AttrKind::Int64, AttrKind::Reference]);
        let mut tracker = AllocationTracker::new();
        let idx = tracker
            .try_track(&model, BlockId::entry(), 0, StableId(1))
            .unwrap();
        assert_eq!(tracker.get(idx).attr_regs.len(), 2);
        assert!(!tracker.get(idx).bigint);
    }

    #[test]
    fn try_track_rejects_unknown_stable() {
        let model = FakeObjectModel::new();
        let mut tracker = AllocationTracker::new();
        assert!(tracker
            .try_track(&model, BlockId::entry(), 0, StableId(7))
            .is_none());
    }

    #[test]
    fn mark_irreplaceable_propagates_transitively() {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[AttrKind::Int64]);
        let mut tracker = AllocationTracker::new();
        let a = tracker
            .try_track(&model, BlockId::entry(), 0, StableId(1))
            .unwrap();
        let b = tracker
            .try_track(&model, BlockId::entry(), 1, StableId(1))
            .unwrap();
        let c = tracker
            .try_track(&model, BlockId::entry(), 2, StableId(1))
            .unwrap();
        tracker.add_escape_dependency(a, b);
        tracker.add_escape_dependency(b, c);
        tracker.mark_irreplaceable(a);
        assert!(tracker.is_irreplaceable(a));
        assert!(tracker.is_irreplaceable(b));
        assert!(tracker.is_irreplaceable(c));
    }
}

//! Deopt Bookkeeper (`spec.md` §4.7).
//!
//! Two side tables read by the deoptimization trampoline to rebuild heap
//! state before resuming the interpreter: which registers carry a
//! materialized object's attributes, and which materialize-info entry a
//! given deopt point needs.

use super::allocation::{AllocIndex, AllocationTracker};
use crate::ir::{DeoptIndex, RegId, StableId};
use std::collections::HashMap;

/// The stable slot and concrete attribute registers needed to rebuild one
/// object, memoized per allocation.
#[derive(Debug, Clone)]
pub struct MaterializeInfo {
    pub stable: StableId,
    pub attr_registers: Vec<RegId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterializeInfoIndex(pub usize);

#[derive(Debug, Default)]
pub struct DeoptTables {
    materialize_info: Vec<MaterializeInfo>,
    /// `(deopt index) -> (materialize-info index, target register)` entries.
    deopt_points: HashMap<DeoptIndex, Vec<(MaterializeInfoIndex, RegId)>>,
    /// Synthetic registers that must be kept live across a deopt index, even
    /// when that index is synthetic and has no materialize-info of its own.
    deopt_usages: HashMap<DeoptIndex, Vec<RegId>>,
}

impl DeoptTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sole producer of `MaterializeInfo` entries; memoizes per allocation so
    /// repeated deopt points referencing the same allocation share one entry.
    pub fn get_deopt_materialization_info(
        &mut self,
        tracker: &mut AllocationTracker,
        alloc: AllocIndex,
        stable: StableId,
        attr_registers: Vec<RegId>,
    ) -> MaterializeInfoIndex {
        if let Some(existing) = tracker.get(alloc).deopt_info {
            return MaterializeInfoIndex(existing);
        }
        let index = self.materialize_info.len();
        self.materialize_info.push(MaterializeInfo {
            stable,
            attr_registers,
        });
        tracker.get_mut(alloc).deopt_info = Some(index);
        MaterializeInfoIndex(index)
    }

    pub fn materialize_info(&self, index: MaterializeInfoIndex) -> &MaterializeInfo {
        &self.materialize_info[index.0]
    }

    pub fn add_deopt_point(&mut self, deopt: DeoptIndex, info: MaterializeInfoIndex, target: RegId) {
        self.deopt_points.entry(deopt).or_default().push((info, target));
    }

    pub fn add_deopt_usage(&mut self, deopt: DeoptIndex, reg: RegId) {
        let uses = self.deopt_usages.entry(deopt).or_default();
        if !uses.contains(&reg) {
            uses.push(reg);
        }
    }

    pub fn deopt_points_for(&self, deopt: DeoptIndex) -> &[(MaterializeInfoIndex, RegId)] {
        self.deopt_points.get(&deopt).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn deopt_usages_for(&self, deopt: DeoptIndex) -> &[RegId] {
        self.deopt_usages.get(&deopt).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttrKind, BlockId};
    use crate::object_model::FakeObjectModel;

    #[test]
    fn materialize_info_is_memoized_per_allocation() {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[AttrKind::Int64]);
        let mut tracker = AllocationTracker::new();
        let alloc = tracker
            .try_track(&model, BlockId::entry(), 0, StableId(1))
            .unwrap();
        let mut tables = DeoptTables::new();
        let first = tables.get_deopt_materialization_info(&mut tracker, alloc, StableId(1), vec![RegId::new(0)]);
        let second = tables.get_deopt_materialization_info(&mut tracker, alloc, StableId(1), vec![RegId::new(0)]);
        assert_eq!(first, second);
        assert_eq!(tables.materialize_info(first).attr_registers, vec![RegId::new(0)]);
    }

    #[test]
    fn deopt_usage_is_deduped() {
        let mut tables = DeoptTables::new();
        let d = DeoptIndex::Concrete(1);
        tables.add_deopt_usage(d, RegId::new(2));
        tables.add_deopt_usage(d, RegId::new(2));
        assert_eq!(tables.deopt_usages_for(d).len(), 1);
    }
}

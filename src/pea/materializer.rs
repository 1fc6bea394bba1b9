//! Materialization Planner (`spec.md` §4.5).

use super::allocation::{AllocIndex, AllocationTracker};
use super::block_state::BlockState;
use super::shadow_facts::{FactKey, ShadowFactTable};
use super::transform::{MaterializationId, MaterializeTarget, TargetReg, Transform};
use crate::ir::{BlockId, ControlFlowGraph, RegId};

#[derive(Debug, Clone)]
pub struct MaterializationRecord {
    pub alloc: AllocIndex,
    pub target: MaterializeTarget,
    pub anchor_block: BlockId,
    pub anchor_instr: usize,
}

/// Owns every planned materialization for the pass. Shared across blocks so
/// a later block can still append to an earlier block's target list.
#[derive(Debug, Default)]
pub struct Materializer {
    records: Vec<MaterializationRecord>,
}

impl Materializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(
        &mut self,
        alloc: AllocIndex,
        anchor_block: BlockId,
        anchor_instr: usize,
        initial_target: TargetReg,
    ) -> MaterializationId {
        let id = MaterializationId(self.records.len());
        let mut target = MaterializeTarget::new();
        target.push(initial_target);
        self.records.push(MaterializationRecord {
            alloc,
            target,
            anchor_block,
            anchor_instr,
        });
        id
    }

    pub fn append_target(&mut self, id: MaterializationId, reg: TargetReg) {
        self.records[id.0].target.push(reg);
    }

    pub fn record(&self, id: MaterializationId) -> &MaterializationRecord {
        &self.records[id.0]
    }

    pub fn records(&self) -> &[MaterializationRecord] {
        &self.records
    }
}

/// Approximates "is `consumer_block` within a sub-graph forked since
/// `alloc_block`?" by walking the RPO slice between them and tracking a
/// running sum of `successors - 1` (fork) and `predecessors - 1` (merge),
/// exactly as `spec.md` §4.5/§9 describe. Returns `true` (favor
/// materializing) whenever the walk cannot place both blocks in `rpo`.
pub fn in_branch_since(
    cfg: &ControlFlowGraph,
    rpo: &[BlockId],
    alloc_block: BlockId,
    consumer_block: BlockId,
) -> bool {
    let start = match rpo.iter().position(|b| *b == alloc_block) {
        Some(i) => i,
        None => return true,
    };
    let end = match rpo.iter().position(|b| *b == consumer_block) {
        Some(i) => i,
        None => return true,
    };
    if end <= start {
        return true;
    }

    let mut balance: i64 = 0;
    for i in start..end {
        if let Some(b) = cfg.get_block(rpo[i]) {
            let succs = b.successors().len() as i64;
            if succs > 1 {
                balance += succs - 1;
            }
        }
        if let Some(b) = cfg.get_block(rpo[i + 1]) {
            let preds = b.predecessors.len() as i64;
            if preds > 1 {
                balance -= preds - 1;
            }
        }
    }
    balance > 0
}

/// Walks backward from `instr_index` over argument-sequence opcodes so a
/// materialization never lands inside one (`spec.md` §4.5 insertion-point
/// discipline).
pub fn find_insertion_point(cfg: &ControlFlowGraph, block: BlockId, instr_index: usize) -> usize {
    let b = match cfg.get_block(block) {
        Some(b) => b,
        None => return instr_index,
    };
    let mut idx = instr_index;
    while idx > 0 && b.instructions[idx - 1].is_arg_opcode() {
        idx -= 1;
    }
    idx
}

/// `real_object_required(op, can_materialize)` of `spec.md` §4.5.
#[allow(clippy::too_many_arguments)]
pub fn real_object_required(
    tracker: &mut AllocationTracker,
    facts: &ShadowFactTable,
    materializer: &mut Materializer,
    block_state: &mut BlockState,
    cfg: &ControlFlowGraph,
    rpo: &[BlockId],
    alloc: AllocIndex,
    consumer_block: BlockId,
    consumer_instr: usize,
    consumer_reg: RegId,
    can_materialize: bool,
) {
    if tracker.is_irreplaceable(alloc) {
        return;
    }

    let (read, bigint, origin_block, attr_count, attr_regs) = {
        let a = tracker.get(alloc);
        (a.read, a.bigint, a.origin_block, a.attr_count(), a.attr_regs.clone())
    };
    let worth_materializing =
        read || bigint || in_branch_since(cfg, rpo, origin_block, consumer_block);

    if !worth_materializing || !can_materialize {
        tracker.mark_irreplaceable(alloc);
        return;
    }

    let insertion_idx = find_insertion_point(cfg, consumer_block, consumer_instr);
    let id = materializer.plan(
        alloc,
        consumer_block,
        insertion_idx,
        TargetReg::Concrete(consumer_reg),
    );
    block_state
        .alloc_state(alloc, attr_count)
        .materializations
        .push(id);
    block_state.push(Transform::Materialize { id, alloc });

    for hyp in attr_regs {
        if let Some(fact) = facts.get(&FactKey::Hypothetical(hyp)) {
            if let Some(dep_alloc) = fact.aliases_allocation {
                real_object_required(
                    tracker,
                    facts,
                    materializer,
                    block_state,
                    cfg,
                    rpo,
                    dep_alloc,
                    consumer_block,
                    consumer_instr,
                    consumer_reg,
                    can_materialize,
                );
            }
        }
    }
}

/// `handle_materialized_usages` of `spec.md` §4.5: appends `consumer_reg` to
/// every materialization already active for `alloc` in this block.
pub fn handle_materialized_usages(
    block_state: &BlockState,
    materializer: &mut Materializer,
    alloc: AllocIndex,
    consumer_reg: RegId,
) {
    if let Some(state) = block_state.alloc_states.get(&alloc) {
        for id in state.materializations.clone() {
            materializer.append_target(id, TargetReg::Concrete(consumer_reg));
        }
    }
}

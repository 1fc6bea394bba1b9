//! The Analyzer (`spec.md` §4.2): walks blocks in reverse postorder,
//! dispatches each instruction against the opcode table, and accumulates
//! planned `Transform`s without mutating the graph.

use super::allocation::AllocationTracker;
use super::bigint;
use super::block_state::BlockState;
use super::deopt::DeoptTables;
use super::error::BailoutReason;
use super::materializer::{handle_materialized_usages, real_object_required, Materializer};
use super::merge::merge_entry_state;
use super::shadow_facts::{FactKey, ShadowFact, ShadowFactTable, TrackedRegisterTable};
use super::transform::{Transform, TargetReg};
use crate::config::PeaConfig;
use crate::ir::{BlockId, ControlFlowGraph, IrInstruction, RegId, StableId, VivifyKind};
use crate::object_model::ObjectModel;
use log::{debug, trace};
use std::collections::HashMap;

pub struct AnalysisResult {
    pub tracker: AllocationTracker,
    pub facts: ShadowFactTable,
    pub tracked_regs: TrackedRegisterTable,
    pub materializer: Materializer,
    pub deopt: DeoptTables,
    pub value_types: HashMap<RegId, StableId>,
    /// Exit `BlockState` (including the planned transformation list) per
    /// block, keyed for the Transformer's linear-order walk (`spec.md` §5).
    pub block_states: HashMap<BlockId, BlockState>,
}

impl AnalysisResult {
    pub fn replaceable_count(&self) -> usize {
        self.tracker
            .allocations
            .iter()
            .filter(|a| !a.irreplaceable)
            .count()
    }
}

/// Runs the Analyzer over `cfg`. Returns `Ok` with every planned transform
/// even when zero allocations end up replaceable; returns `Err` only for
/// the bailout conditions of `spec.md` §7 that must stop before any
/// `Transform` is produced at all.
pub fn analyze(
    cfg: &ControlFlowGraph,
    model: &dyn ObjectModel,
    config: &PeaConfig,
) -> Result<AnalysisResult, BailoutReason> {
    if config.disabled {
        return Err(BailoutReason::Disabled);
    }

    let back_edges = crate::ir::find_back_edges(cfg);
    if !back_edges.is_empty() {
        debug!("pea: aborting, {} back edge(s) found", back_edges.len());
        return Err(BailoutReason::BackEdge);
    }

    let rpo = crate::ir::reverse_postorder(cfg);
    let mut tracker = AllocationTracker::new();
    let mut facts = ShadowFactTable::new();
    let mut tracked_regs = TrackedRegisterTable::new();
    let mut materializer = Materializer::new();
    let mut deopt = DeoptTables::new();
    let mut value_types: HashMap<RegId, StableId> = HashMap::new();
    let mut block_states: HashMap<BlockId, BlockState> = HashMap::new();

    for &block_id in &rpo {
        let mut state = merge_entry_state(cfg, block_id, &block_states, &mut tracker);
        let block = cfg
            .get_block(block_id)
            .expect("rpo only lists blocks present in the graph");

        // Phi nodes are evaluated before any instruction in the block
        // (`spec.md` §4.2 dispatch table): a single incoming value just
        // aliases the hypothetical register forward, but a merge of two or
        // more distinct predecessor values can't be represented
        // hypothetically, so it forces the allocation(s) it merges to
        // materialize.
        for phi in &block.phi_nodes {
            if phi.incoming.len() == 1 {
                let src = phi.incoming[0].1;
                if let Some(alloc) = tracked_regs.allocation_of(src) {
                    tracked_regs.track(phi.dest, alloc);
                    facts.copy(FactKey::Concrete(src), FactKey::Concrete(phi.dest));
                    if let Some(t) = value_types.get(&src).copied() {
                        value_types.insert(phi.dest, t);
                    }
                }
            } else {
                for &(_, src) in &phi.incoming {
                    if let Some(alloc) = tracked_regs.allocation_of(src) {
                        real_object_required(
                            &mut tracker, &facts, &mut materializer, &mut state, cfg, &rpo,
                            alloc, block_id, 0, src, false,
                        );
                    }
                }
            }
        }

        for (instr_idx, instruction) in block.instructions.iter().enumerate() {
            dispatch(
                &mut tracker,
                &mut facts,
                &mut tracked_regs,
                &mut materializer,
                &mut value_types,
                &mut state,
                cfg,
                &rpo,
                model,
                config,
                block_id,
                instr_idx,
                instruction,
            );
        }

        // A tracked allocation can flow straight into the terminator (a
        // `return` or a branch condition) with no intervening instruction;
        // treat that the same as any other fall-through read, anchored past
        // the last instruction index so the Transformer inserts there.
        let terminator_instr = block.instructions.len();
        for reg in block.terminator.uses() {
            for alloc in tracked_regs.allocation_of(reg) {
                handle_materialized_usages(&mut state, &mut materializer, alloc, reg);
                real_object_required(
                    &mut tracker, &facts, &mut materializer, &mut state, cfg, &rpo, alloc,
                    block_id, terminator_instr, reg, true,
                );
            }
        }

        block_states.insert(block_id, state);
    }

    debug!(
        "pea: analysis complete, {} allocation(s) tracked",
        tracker.allocations.len()
    );

    Ok(AnalysisResult {
        tracker,
        facts,
        tracked_regs,
        materializer,
        deopt,
        value_types,
        block_states,
    })
}

#[allow(clippy::too_many_arguments)]
fn dispatch(
    tracker: &mut AllocationTracker,
    facts: &mut ShadowFactTable,
    tracked_regs: &mut TrackedRegisterTable,
    materializer: &mut Materializer,
    value_types: &mut HashMap<RegId, StableId>,
    state: &mut BlockState,
    cfg: &ControlFlowGraph,
    rpo: &[BlockId],
    model: &dyn ObjectModel,
    config: &PeaConfig,
    block: BlockId,
    instr: usize,
    instruction: &IrInstruction,
) {
    // Step 2 of §4.2: register materialization-target usages for every
    // read-operand that aliases an allocation already materialized here.
    for reg in instruction.uses() {
        if let Some(alloc) = tracked_regs.allocation_of(reg) {
            handle_materialized_usages(state, materializer, alloc, reg);
        }
    }

    // Step 1: deopt-carrying instructions get a deopt point for every
    // tracked allocation still live into them.
    if let Some(deopt_index) = instruction.deopt_index() {
        for alloc_idx in 0..tracker.allocations.len() {
            let alive = state
                .alloc_states
                .get(&alloc_idx)
                .map(|a| a.seen)
                .unwrap_or(false);
            if !alive || tracker.is_irreplaceable(alloc_idx) {
                continue;
            }
            // The materialize-info entry needs concrete attribute registers,
            // which only exist once the Transformer resolves this
            // allocation's hypothetical registers; `AddDeoptPoint` carries
            // just the allocation index and the Transformer calls
            // `get_deopt_materialization_info` when it applies the transform.
            state.push(Transform::AddDeoptPoint {
                block,
                instr,
                deopt: deopt_index,
                alloc: alloc_idx,
            });
            for hyp in tracker.get(alloc_idx).attr_regs.clone() {
                state.push(Transform::AddDeoptUsage {
                    deopt: deopt_index,
                    target: TargetReg::Hypothetical(hyp),
                });
            }
        }
    }

    match instruction {
        IrInstruction::FastCreate { dest, stable } => {
            if let Some(alloc) = tracker.try_track(model, block, instr, *stable) {
                trace!("pea: tracking allocation {} from fastcreate at {}:{}", alloc, block, instr);
                state.push(Transform::DeleteFastCreate { alloc, block, instr });
                tracked_regs.track(*dest, alloc);
                value_types.insert(*dest, *stable);
                state.alloc_state(alloc, tracker.get(alloc).attr_count()).seen = true;
            }
        }
        IrInstruction::BigIntMaterializeOp { dest, stable, unboxed } => {
            if let Some(alloc) = tracker.try_track(model, block, instr, *stable) {
                state.push(Transform::UnmaterializeBigInt {
                    block,
                    instr,
                    alloc,
                    unboxed: *unboxed,
                });
                tracked_regs.track(*dest, alloc);
                value_types.insert(*dest, *stable);
                state.alloc_state(alloc, tracker.get(alloc).attr_count()).seen = true;
            }
        }
        IrInstruction::Set { dest, src } => {
            if let Some(alloc) = tracked_regs.allocation_of(*src) {
                state.push(Transform::DeleteSet { block, instr });
                tracked_regs.track(*dest, alloc);
                facts.copy(FactKey::Concrete(*src), FactKey::Concrete(*dest));
                if let Some(t) = value_types.get(src).copied() {
                    value_types.insert(*dest, t);
                }
            }
        }
        IrInstruction::BindAttr { target, offset, value } => {
            if let Some(alloc) = tracked_regs.allocation_of(*target) {
                let stable = tracker.get(alloc).stable;
                if let Some(shape) = model.opaque_shape(stable) {
                    if let Some(idx) = shape.attr_index_of_offset(*offset) {
                        let hyp = tracker.get(alloc).attr_regs[idx];
                        state.alloc_state(alloc, shape.attr_count).used[idx] = true;
                        let aliased = tracked_regs.allocation_of(*value);
                        if shape.attr_kind[idx] == crate::ir::AttrKind::Reference {
                            if let Some(dep) = aliased {
                                tracker.add_escape_dependency(alloc, dep);
                            }
                            facts.set(
                                FactKey::Hypothetical(hyp),
                                ShadowFact {
                                    known_type: value_types.get(value).copied(),
                                    known_concrete: aliased.is_some(),
                                    depends_on: alloc,
                                    aliases_allocation: aliased,
                                },
                            );
                        }
                        if aliased.is_some() {
                            // `value` is itself a still-replaceable
                            // allocation with no concrete register behind
                            // it: the escape dependency and shadow fact
                            // above are all the bookkeeping this bind
                            // needs, so the instruction is just removed
                            // instead of emitted as a write of a register
                            // that will never be defined.
                            state.push(Transform::DeleteBindAttr { block, instr, alloc });
                        } else {
                            state.push(Transform::BindAttrToSet {
                                block,
                                instr,
                                hyp_reg: hyp,
                                value: *value,
                            });
                        }
                    }
                }
            } else if let Some(value_alloc) = tracked_regs.allocation_of(*value) {
                // Bind into an untracked target, reference kind: the source
                // must materialize (`spec.md` §4.2 dispatch table).
                real_object_required(
                    tracker, facts, materializer, state, cfg, rpo, value_alloc, block, instr,
                    *value, true,
                );
            }
        }
        IrInstruction::GetAttr { dest, target, offset } => {
            if let Some(alloc) = tracked_regs.allocation_of(*target) {
                let stable = tracker.get(alloc).stable;
                if let Some(shape) = model.opaque_shape(stable) {
                    if let Some(idx) = shape.attr_index_of_offset(*offset) {
                        let hyp = tracker.get(alloc).attr_regs[idx];
                        tracker.get_mut(alloc).read = true;
                        state.push(Transform::GetAttrToSet {
                            block,
                            instr,
                            dest: *dest,
                            hyp_reg: hyp,
                        });
                        if shape.attr_kind[idx] == crate::ir::AttrKind::Reference {
                            let src_key = FactKey::Hypothetical(hyp);
                            facts.copy(src_key, FactKey::Concrete(*dest));
                            if facts.is_live(&src_key, tracker) {
                                if let Some(fact) = facts.get(&src_key) {
                                    if let Some(aliased) = fact.aliases_allocation {
                                        tracked_regs.track(*dest, aliased);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        IrInstruction::GetAttrAutoviv { dest, target, offset, vivify } => {
            if let Some(alloc) = tracked_regs.allocation_of(*target) {
                let stable = tracker.get(alloc).stable;
                if let Some(shape) = model.opaque_shape(stable) {
                    if let Some(idx) = shape.attr_index_of_offset(*offset) {
                        let already_written = state
                            .alloc_state(alloc, shape.attr_count)
                            .used[idx];
                        if already_written {
                            let hyp = tracker.get(alloc).attr_regs[idx];
                            tracker.get_mut(alloc).read = true;
                            state.push(Transform::GetAttrToSet {
                                block,
                                instr,
                                dest: *dest,
                                hyp_reg: hyp,
                            });
                        } else {
                            let hyp = tracker.get(alloc).attr_regs[idx];
                            state.alloc_state(alloc, shape.attr_count).used[idx] = true;
                            match vivify {
                                VivifyKind::TypeObject => state.push(Transform::VivifyType {
                                    block,
                                    instr,
                                    hyp_reg: hyp,
                                    stable,
                                }),
                                VivifyKind::ClonePrototype => state.push(Transform::VivifyConcrete {
                                    block,
                                    instr,
                                    hyp_reg: hyp,
                                    prototype: stable,
                                }),
                            }
                        }
                    }
                }
            }
        }
        IrInstruction::DecontI { dest, src } => {
            if let Some(alloc) = tracked_regs.allocation_of(*src) {
                if let Some(bigint_idx) = tracker.get(alloc).bigint_attr_index {
                    let hyp = tracker.get(alloc).attr_regs[bigint_idx];
                    state.push(Transform::UnboxBigInt {
                        block,
                        instr,
                        dest: *dest,
                        hyp_reg: hyp,
                    });
                } else {
                    real_object_required(tracker, facts, materializer, state, cfg, rpo, alloc, block, instr, *src, true);
                }
            }
        }
        IrInstruction::BigIntBinary { op, dest, result_stable, lhs, rhs, .. } => {
            if config.disable_bigint {
                fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *lhs);
                fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *rhs);
                return;
            }
            let lhs_stable = value_types.get(lhs).copied();
            let rhs_stable = value_types.get(rhs).copied();
            if let (Some(lhs_stable), Some(rhs_stable)) = (lhs_stable, rhs_stable) {
                if let Some((alloc, transform)) = bigint::decompose_binary(
                    tracker, tracked_regs, model, block, instr, *op, *result_stable, *lhs,
                    lhs_stable, *rhs, rhs_stable,
                ) {
                    tracked_regs.track(*dest, alloc);
                    value_types.insert(*dest, *result_stable);
                    state.push(transform);
                    return;
                }
            }
            fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *lhs);
            fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *rhs);
        }
        IrInstruction::BigIntUnary { op, dest, result_stable, operand, .. } => {
            let operand_stable = value_types.get(operand).copied();
            if !config.disable_bigint {
                if let Some(operand_stable) = operand_stable {
                    if let Some((alloc, transform)) = bigint::decompose_unary(
                        tracker, tracked_regs, model, block, instr, *op, *result_stable,
                        *operand, operand_stable,
                    ) {
                        tracked_regs.track(*dest, alloc);
                        value_types.insert(*dest, *result_stable);
                        state.push(transform);
                        return;
                    }
                }
            }
            fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *operand);
        }
        IrInstruction::BigIntRelational { op, lhs, rhs, .. } => {
            let lhs_stable = value_types.get(lhs).copied();
            let rhs_stable = value_types.get(rhs).copied();
            if !config.disable_bigint {
                if let (Some(lhs_stable), Some(rhs_stable)) = (lhs_stable, rhs_stable) {
                    if let Some(transform) = bigint::decompose_relational(
                        tracker, tracked_regs, model, block, instr, *op, *lhs, lhs_stable, *rhs,
                        rhs_stable,
                    ) {
                        state.push(transform);
                        return;
                    }
                }
            }
            fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *lhs);
            fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *rhs);
        }
        IrInstruction::GuardConcrete { operand, stable, deopt: _ } => {
            if let Some(alloc) = tracked_regs.allocation_of(*operand) {
                let key = FactKey::Concrete(*operand);
                let proven = facts.is_live(&key, tracker)
                    && facts
                        .get(&key)
                        .map(|f| f.known_concrete && f.known_type == Some(*stable))
                        .unwrap_or(false);
                if proven {
                    tracker.get_mut(alloc).read = true;
                    state.push(Transform::DeleteGuard { block, instr, alloc });
                } else {
                    real_object_required(tracker, facts, materializer, state, cfg, rpo, alloc, block, instr, *operand, true);
                }
            }
        }
        IrInstruction::ProfAllocated { operand, stable, .. } => {
            if tracked_regs.allocation_of(*operand).is_some() {
                state.push(Transform::ProfAllocated { block, instr, stable: *stable });
            }
        }
        IrInstruction::Unhandled { reads, .. } => {
            for reg in reads {
                fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, *reg);
            }
        }
        _ => {
            for reg in instruction.uses() {
                fallthrough_use(tracker, facts, materializer, state, cfg, rpo, tracked_regs, block, instr, reg);
            }
        }
    }
}

/// Fall-through: any other read of a tracked operand invokes
/// `real_object_required` (`spec.md` §4.2 step 4).
#[allow(clippy::too_many_arguments)]
fn fallthrough_use(
    tracker: &mut AllocationTracker,
    facts: &ShadowFactTable,
    materializer: &mut Materializer,
    state: &mut BlockState,
    cfg: &ControlFlowGraph,
    rpo: &[BlockId],
    tracked_regs: &TrackedRegisterTable,
    block: BlockId,
    instr: usize,
    reg: RegId,
) {
    if let Some(alloc) = tracked_regs.allocation_of(reg) {
        real_object_required(tracker, facts, materializer, state, cfg, rpo, alloc, block, instr, reg, true);
    }
}

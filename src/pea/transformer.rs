//! The Transformer (`spec.md` §4.6): walks every block in the same reverse
//! postorder the Analyzer used and applies each planned transformation in
//! sequence, mutating the graph in place. All mutation is deferred until
//! here — analysis only plans.

use super::allocation::{AllocIndex, AllocationTracker, HypotheticalReg};
use super::analyzer::AnalysisResult;
use super::deopt::DeoptTables;
use super::materializer::Materializer;
use super::transform::{BigIntOperandRef, Transform, TargetReg};
use crate::ir::{BlockId, ControlFlowGraph, IrInstruction, RegId};
use crate::object_model::ObjectModel;
use log::trace;
use std::collections::HashMap;

/// Outcome of a completed Transformer pass.
pub struct TransformReport {
    pub transforms_applied: usize,
    pub transforms_skipped_irreplaceable: usize,
    pub deopt: DeoptTables,
}

struct ApplyContext<'a> {
    tracker: &'a mut AllocationTracker,
    materializer: &'a Materializer,
    model: &'a dyn ObjectModel,
    hyp_to_alloc: HashMap<HypotheticalReg, AllocIndex>,
    concrete: HashMap<HypotheticalReg, RegId>,
    deopt: DeoptTables,
    applied: usize,
    skipped: usize,
}

impl<'a> ApplyContext<'a> {
    /// The allocation a transform is planned on behalf of, resolving both
    /// transforms that carry an explicit `alloc` and ones that only carry a
    /// hypothetical register belonging to one.
    fn owning_allocation(&self, transform: &Transform) -> Option<AllocIndex> {
        if let Some(alloc) = transform.owning_allocation() {
            return Some(alloc);
        }
        match transform {
            Transform::GetAttrToSet { hyp_reg, .. }
            | Transform::BindAttrToSet { hyp_reg, .. }
            | Transform::UnboxBigInt { hyp_reg, .. }
            | Transform::VivifyType { hyp_reg, .. }
            | Transform::VivifyConcrete { hyp_reg, .. } => {
                self.hyp_to_alloc.get(hyp_reg).copied()
            }
            _ => None,
        }
    }

    fn is_skipped(&self, transform: &Transform) -> bool {
        match self.owning_allocation(transform) {
            Some(alloc) => self.tracker.is_irreplaceable(alloc),
            None => false,
        }
    }

    fn resolve(&self, hyp: HypotheticalReg) -> Option<RegId> {
        self.concrete.get(&hyp).copied()
    }

    fn materialize_concrete(&mut self, cfg: &mut ControlFlowGraph, alloc: AllocIndex) {
        let attr_regs = self.tracker.get(alloc).attr_regs.clone();
        for hyp in attr_regs {
            self.concrete.entry(hyp).or_insert_with(|| cfg.fresh_reg());
        }
    }
}

/// Applies every planned transformation from `analysis` onto `cfg`.
pub fn apply(
    cfg: &mut ControlFlowGraph,
    mut analysis: AnalysisResult,
    model: &dyn ObjectModel,
) -> TransformReport {
    let mut hyp_to_alloc = HashMap::new();
    for alloc in &analysis.tracker.allocations {
        for hyp in &alloc.attr_regs {
            hyp_to_alloc.insert(*hyp, alloc.index);
        }
    }

    let mut ctx = ApplyContext {
        tracker: &mut analysis.tracker,
        materializer: &analysis.materializer,
        model,
        hyp_to_alloc,
        concrete: HashMap::new(),
        deopt: analysis.deopt,
        applied: 0,
        skipped: 0,
    };

    let mut deletions: std::collections::HashSet<(BlockId, usize)> = Default::default();
    let mut replacements: HashMap<(BlockId, usize), IrInstruction> = HashMap::new();
    let mut insertions: HashMap<(BlockId, usize), Vec<IrInstruction>> = HashMap::new();

    // Walk in reverse postorder, not plain ascending id order: an
    // allocation's owning block always dominates every consumer of its
    // hypothetical registers, and RPO is the traversal that guarantees a
    // dominator is visited (and its registers made concrete) first.
    let rpo = crate::ir::reverse_postorder(cfg);

    for block_id in &rpo {
        let Some(state) = analysis.block_states.get(block_id) else {
            continue;
        };
        for transform in &state.transformations {
            if ctx.is_skipped(transform) {
                ctx.skipped += 1;
                trace!("pea: skipping transform on irreplaceable allocation: {:?}", transform);
                continue;
            }
            ctx.applied += 1;
            apply_one(
                &mut ctx,
                cfg,
                transform,
                &mut deletions,
                &mut replacements,
                &mut insertions,
            );
        }
    }

    rewrite_blocks(cfg, &rpo, &deletions, &replacements, &insertions);

    TransformReport {
        transforms_applied: ctx.applied,
        transforms_skipped_irreplaceable: ctx.skipped,
        deopt: ctx.deopt,
    }
}

fn apply_one(
    ctx: &mut ApplyContext,
    cfg: &mut ControlFlowGraph,
    transform: &Transform,
    deletions: &mut std::collections::HashSet<(BlockId, usize)>,
    replacements: &mut HashMap<(BlockId, usize), IrInstruction>,
    insertions: &mut HashMap<(BlockId, usize), Vec<IrInstruction>>,
) {
    match transform {
        Transform::DeleteFastCreate { alloc, block, instr } => {
            ctx.materialize_concrete(cfg, *alloc);
            deletions.insert((*block, *instr));
        }
        Transform::UnmaterializeBigInt { alloc, block, instr, unboxed } => {
            ctx.materialize_concrete(cfg, *alloc);
            // The attribute register already carries the value: fold the
            // unboxed operand directly into the synthetic slot.
            let attr_regs = ctx.tracker.get(*alloc).attr_regs.clone();
            if let Some(bigint_idx) = ctx.tracker.get(*alloc).bigint_attr_index {
                if let Some(concrete) = ctx.resolve(attr_regs[bigint_idx]) {
                    replacements.insert(
                        (*block, *instr),
                        IrInstruction::Set {
                            dest: concrete,
                            src: *unboxed,
                        },
                    );
                }
            } else {
                deletions.insert((*block, *instr));
            }
        }
        Transform::DeleteSet { block, instr } => {
            deletions.insert((*block, *instr));
        }
        Transform::GetAttrToSet { block, instr, dest, hyp_reg } => {
            if let Some(src) = ctx.resolve(*hyp_reg) {
                replacements.insert((*block, *instr), IrInstruction::Set { dest: *dest, src });
            }
        }
        Transform::BindAttrToSet { block, instr, hyp_reg, value } => {
            if let Some(dest) = ctx.resolve(*hyp_reg) {
                replacements.insert((*block, *instr), IrInstruction::Set { dest, src: *value });
            }
        }
        Transform::DeleteBindAttr { block, instr, .. } => {
            deletions.insert((*block, *instr));
        }
        Transform::DeleteGuard { block, instr, .. } => {
            deletions.insert((*block, *instr));
        }
        Transform::ProfAllocated { block, instr, stable } => {
            let operand = cfg
                .get_block(*block)
                .and_then(|b| b.instructions.get(*instr))
                .and_then(|i| i.uses().first().copied())
                .unwrap_or_else(|| cfg.fresh_reg());
            replacements.insert(
                (*block, *instr),
                IrInstruction::ProfAllocated {
                    operand,
                    stable: *stable,
                    replaced: true,
                },
            );
        }
        Transform::UnboxBigInt { block, instr, dest, hyp_reg } => {
            if let Some(src) = ctx.resolve(*hyp_reg) {
                replacements.insert((*block, *instr), IrInstruction::Set { dest: *dest, src });
            }
        }
        Transform::VivifyType { block, instr, hyp_reg, .. } => {
            if let Some(dest) = ctx.resolve(*hyp_reg) {
                replacements.insert(
                    (*block, *instr),
                    IrInstruction::GetAttrAutoviv {
                        dest,
                        target: dest,
                        offset: 0,
                        vivify: crate::ir::VivifyKind::TypeObject,
                    },
                );
            }
        }
        Transform::VivifyConcrete { block, instr, hyp_reg, .. } => {
            if let Some(dest) = ctx.resolve(*hyp_reg) {
                replacements.insert(
                    (*block, *instr),
                    IrInstruction::GetAttrAutoviv {
                        dest,
                        target: dest,
                        offset: 0,
                        vivify: crate::ir::VivifyKind::ClonePrototype,
                    },
                );
            }
        }
        Transform::DecomposeBigIntBinary { alloc, block, instr, op, lhs, rhs } => {
            ctx.materialize_concrete(cfg, *alloc);
            let bigint_idx = ctx.tracker.get(*alloc).bigint_attr_index.expect("big-integer attribute index");
            let attr_regs = ctx.tracker.get(*alloc).attr_regs.clone();
            let dest = ctx
                .resolve(attr_regs[bigint_idx])
                .expect("result hypothetical register just made concrete");
            let lhs_reg = resolve_operand_reg(ctx, cfg, block, instr, lhs, insertions);
            let rhs_reg = resolve_operand_reg(ctx, cfg, block, instr, rhs, insertions);
            replacements.insert(
                (*block, *instr),
                IrInstruction::BigIntBinaryUnboxed {
                    op: *op,
                    dest,
                    lhs: lhs_reg,
                    rhs: rhs_reg,
                },
            );
        }
        Transform::DecomposeBigIntUnary { alloc, block, instr, op, operand } => {
            ctx.materialize_concrete(cfg, *alloc);
            let bigint_idx = ctx.tracker.get(*alloc).bigint_attr_index.expect("big-integer attribute index");
            let attr_regs = ctx.tracker.get(*alloc).attr_regs.clone();
            let dest = ctx
                .resolve(attr_regs[bigint_idx])
                .expect("result hypothetical register just made concrete");
            let operand_reg = resolve_operand_reg(ctx, cfg, block, instr, operand, insertions);
            replacements.insert(
                (*block, *instr),
                IrInstruction::BigIntUnaryUnboxed {
                    op: *op,
                    dest,
                    operand: operand_reg,
                },
            );
        }
        Transform::DecomposeBigIntRelational { block, instr, op, lhs, rhs } => {
            let lhs_reg = resolve_operand_reg(ctx, cfg, block, instr, lhs, insertions);
            let rhs_reg = resolve_operand_reg(ctx, cfg, block, instr, rhs, insertions);
            let dest = match cfg.get_block(*block).and_then(|b| b.instructions.get(*instr)) {
                Some(original) => original.dest().unwrap_or_else(|| cfg.fresh_reg()),
                None => cfg.fresh_reg(),
            };
            replacements.insert(
                (*block, *instr),
                IrInstruction::BigIntRelationalUnboxed {
                    op: *op,
                    dest,
                    lhs: lhs_reg,
                    rhs: rhs_reg,
                },
            );
        }
        Transform::Materialize { id, alloc } => {
            let record = ctx.materializer.record(*id).clone();
            if record.target.is_empty() {
                // Nobody ended up needing this object: no-op, per §3.
                return;
            }
            ctx.materialize_concrete(cfg, *alloc);
            let stable = ctx.tracker.get(*alloc).stable;
            let attr_regs = ctx.tracker.get(*alloc).attr_regs.clone();
            let bigint_idx = ctx.tracker.get(*alloc).bigint_attr_index;

            let materialized = match (bigint_idx, ctx.model.is_boxing_primitive(stable)) {
                (Some(idx), true) if attr_regs.len() == 1 => {
                    let unboxed = ctx
                        .resolve(attr_regs[idx])
                        .expect("bigint attribute register just made concrete");
                    // Zero always lands in every integer cache's covered
                    // range, so it probes whether this boxing type has
                    // cache backing at all, independent of the unboxed
                    // value's actual runtime contents.
                    let cache = ctx.model.integer_cache_lookup(stable, 0);
                    IrInstruction::MaterializeBigInt { dest: cfg.fresh_reg(), unboxed, cache }
                }
                _ => {
                    let shape = ctx.model.opaque_shape(stable);
                    let attrs = attr_regs
                        .iter()
                        .enumerate()
                        .map(|(i, hyp)| {
                            let offset = shape
                                .as_ref()
                                .and_then(|s| s.attr_offset.get(i).copied())
                                .unwrap_or((i as u32) * 8);
                            (offset, ctx.resolve(*hyp).unwrap_or_else(|| cfg.fresh_reg()))
                        })
                        .collect();
                    IrInstruction::MaterializeObject { dest: cfg.fresh_reg(), stable, attrs }
                }
            };
            let dest = materialized.dest().expect("materialize opcodes always have a dest");

            insertions
                .entry((record.anchor_block, record.anchor_instr))
                .or_default()
                .push(materialized);
            for target in record.target.iter() {
                let reg = match target {
                    TargetReg::Concrete(r) => *r,
                    TargetReg::Hypothetical(h) => match ctx.resolve(*h) {
                        Some(r) => r,
                        None => continue,
                    },
                };
                if reg == dest {
                    continue;
                }
                insertions
                    .entry((record.anchor_block, record.anchor_instr))
                    .or_default()
                    .push(IrInstruction::Set { dest: reg, src: dest });
            }
        }
        Transform::AddDeoptPoint { block, instr, deopt, alloc } => {
            let attr_regs = ctx.tracker.get(*alloc).attr_regs.clone();
            let concrete_attrs: Vec<RegId> = attr_regs.iter().filter_map(|h| ctx.resolve(*h)).collect();
            let stable = ctx.tracker.get(*alloc).stable;
            let info = ctx.deopt.get_deopt_materialization_info(ctx.tracker, *alloc, stable, concrete_attrs);
            let target = cfg
                .get_block(*block)
                .and_then(|b| b.instructions.get(*instr))
                .and_then(|i| i.dest())
                .unwrap_or_else(|| cfg.fresh_reg());
            ctx.deopt.add_deopt_point(*deopt, info, target);
        }
        Transform::AddDeoptUsage { deopt, target } => {
            if let TargetReg::Hypothetical(hyp) = target {
                if let Some(reg) = ctx.resolve(*hyp) {
                    ctx.deopt.add_deopt_usage(*deopt, reg);
                }
            } else if let TargetReg::Concrete(reg) = target {
                ctx.deopt.add_deopt_usage(*deopt, *reg);
            }
        }
    }
}

fn resolve_operand_reg(
    ctx: &mut ApplyContext,
    cfg: &mut ControlFlowGraph,
    block: &BlockId,
    instr: &usize,
    operand: &BigIntOperandRef,
    insertions: &mut HashMap<(BlockId, usize), Vec<IrInstruction>>,
) -> RegId {
    match operand {
        BigIntOperandRef::Hypothetical(hyp) => ctx.resolve(*hyp).unwrap_or_else(|| cfg.fresh_reg()),
        BigIntOperandRef::FallbackOffset { target, offset } => {
            let dest = cfg.fresh_reg();
            insertions.entry((*block, *instr)).or_default().push(IrInstruction::GetBigInt {
                dest,
                target: *target,
                offset: *offset,
            });
            dest
        }
    }
}

fn rewrite_blocks(
    cfg: &mut ControlFlowGraph,
    block_ids: &[BlockId],
    deletions: &std::collections::HashSet<(BlockId, usize)>,
    replacements: &HashMap<(BlockId, usize), IrInstruction>,
    insertions: &HashMap<(BlockId, usize), Vec<IrInstruction>>,
) {
    for block_id in block_ids {
        let Some(block) = cfg.get_block_mut(*block_id) else {
            continue;
        };
        let mut rewritten = Vec::with_capacity(block.instructions.len());
        for (idx, original) in block.instructions.iter().enumerate() {
            if let Some(extra) = insertions.get(&(*block_id, idx)) {
                rewritten.extend(extra.iter().cloned());
            }
            if deletions.contains(&(*block_id, idx)) {
                continue;
            }
            match replacements.get(&(*block_id, idx)) {
                Some(replacement) => rewritten.push(replacement.clone()),
                None => rewritten.push(original.clone()),
            }
        }
        // Insertions anchored past the last instruction (a consumer at the
        // block's fall-through edge) land at the very end.
        if let Some(extra) = insertions.get(&(*block_id, block.instructions.len())) {
            rewritten.extend(extra.iter().cloned());
        }
        block.instructions = rewritten;
    }
}

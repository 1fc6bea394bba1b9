//! Big-Integer Decomposition (`spec.md` §4.4).
//!
//! Three rewrite families exploiting that most big-integer boxes are
//! short-lived: producing binary ops, producing unary ops, and relational
//! ops (which produce a plain integer, not a new box).

use super::allocation::{AllocIndex, AllocationTracker};
use super::shadow_facts::TrackedRegisterTable;
use super::transform::{BigIntOperandRef, Transform};
use crate::ir::{BigIntBinOp, BigIntRelOp, BigIntUnOp, BlockId, RegId, StableId};
use crate::object_model::ObjectModel;

/// Resolves one operand of a decomposition: if it aliases a tracked
/// allocation with a big-integer attribute, reuse that allocation's
/// hypothetical register and record the cross-allocation escape dependency
/// (so escape of the consuming result forces materialization of the
/// operand's backing value). Otherwise fall back to a fresh hypothetical
/// register backed by a direct attribute load, recording the offset needed
/// to resolve it at apply time. Returns `None` if `operand`'s static type
/// has no resolvable big-integer offset — callers fall through to
/// `unhandled_instruction`.
fn resolve_operand(
    tracker: &mut AllocationTracker,
    tracked: &TrackedRegisterTable,
    model: &dyn ObjectModel,
    consumer: Option<AllocIndex>,
    operand: RegId,
    operand_stable: StableId,
) -> Option<BigIntOperandRef> {
    if let Some(alloc) = tracked.allocation_of(operand) {
        let bigint_idx = tracker.get(alloc).bigint_attr_index?;
        let hyp = tracker.get(alloc).attr_regs[bigint_idx];
        if let Some(result) = consumer {
            tracker.add_escape_dependency(result, alloc);
        }
        return Some(BigIntOperandRef::Hypothetical(hyp));
    }
    let offset = model.bigint_offset(operand_stable)?;
    Some(BigIntOperandRef::FallbackOffset {
        target: operand,
        offset,
    })
}

/// Producing binary op (add/sub/mul/gcd). `result_stable` is the boxed
/// big-integer type the original instruction would have produced.
#[allow(clippy::too_many_arguments)]
pub fn decompose_binary(
    tracker: &mut AllocationTracker,
    tracked: &mut TrackedRegisterTable,
    model: &dyn ObjectModel,
    block: BlockId,
    instr: usize,
    op: BigIntBinOp,
    result_stable: StableId,
    lhs: RegId,
    lhs_stable: StableId,
    rhs: RegId,
    rhs_stable: StableId,
) -> Option<(AllocIndex, Transform)> {
    let result = tracker.try_track(model, block, instr, result_stable)?;
    let lhs_ref = resolve_operand(tracker, tracked, model, Some(result), lhs, lhs_stable)?;
    let rhs_ref = resolve_operand(tracker, tracked, model, Some(result), rhs, rhs_stable)?;
    tracker
        .get(result)
        .bigint_attr_index
        .expect("result of big-integer decomposition must carry a big-integer attribute");
    Some((
        result,
        Transform::DecomposeBigIntBinary {
            block,
            instr,
            op,
            alloc: result,
            lhs: lhs_ref,
            rhs: rhs_ref,
        },
    ))
}

/// Producing unary op (neg/abs); same shape as `decompose_binary` with one
/// input.
pub fn decompose_unary(
    tracker: &mut AllocationTracker,
    tracked: &mut TrackedRegisterTable,
    model: &dyn ObjectModel,
    block: BlockId,
    instr: usize,
    op: BigIntUnOp,
    result_stable: StableId,
    operand: RegId,
    operand_stable: StableId,
) -> Option<(AllocIndex, Transform)> {
    let result = tracker.try_track(model, block, instr, result_stable)?;
    let operand_ref = resolve_operand(tracker, tracked, model, Some(result), operand, operand_stable)?;
    Some((
        result,
        Transform::DecomposeBigIntUnary {
            block,
            instr,
            op,
            alloc: result,
            operand: operand_ref,
        },
    ))
}

/// Relational op; no result allocation since the result is a plain integer.
/// Both hypothetical registers and both fallback offsets are recorded so the
/// Transformer can decide at apply time which to use.
pub fn decompose_relational(
    tracker: &mut AllocationTracker,
    tracked: &TrackedRegisterTable,
    model: &dyn ObjectModel,
    block: BlockId,
    instr: usize,
    op: BigIntRelOp,
    lhs: RegId,
    lhs_stable: StableId,
    rhs: RegId,
    rhs_stable: StableId,
) -> Option<Transform> {
    let lhs_ref = resolve_operand(tracker, tracked, model, None, lhs, lhs_stable)?;
    let rhs_ref = resolve_operand(tracker, tracked, model, None, rhs, rhs_stable)?;
    Some(Transform::DecomposeBigIntRelational {
        block,
        instr,
        op,
        lhs: lhs_ref,
        rhs: rhs_ref,
    })
}

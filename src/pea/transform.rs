//! Transformation tags — the planned-edit sum type of `spec.md` §3/§4.6.
//!
//! Grounded on `spec.md` §9 "Tagged transforms": a single apply-site switch
//! over a sum type whose variants carry exactly their payload, avoiding
//! dynamic dispatch, following the same shape `scalar_replacement.rs` uses
//! for its `SraCandidate`/`PhiSraCandidate` split.

use super::allocation::{AllocIndex, HypotheticalReg};
use crate::ir::{BigIntBinOp, BigIntRelOp, BigIntUnOp, BlockId, DeoptIndex, RegId, StableId};

/// A single entry in a materialization target list: either a concrete SSA
/// operand already allocated, or a hypothetical register awaiting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetReg {
    Concrete(RegId),
    Hypothetical(HypotheticalReg),
}

/// Append-only, dedup'd list of registers a single materialized object must
/// be written into. Empty means "no one needs it — skip" (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct MaterializeTarget(Vec<TargetReg>);

impl MaterializeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reg: TargetReg) {
        if !self.0.contains(&reg) {
            self.0.push(reg);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetReg> {
        self.0.iter()
    }
}

/// Identifies a planned `materialize` transform shared across blocks: a
/// consumer in a different block can still append to its target list via
/// `handle_materialized_usages` (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterializationId(pub usize);

/// Where to load a big-integer operand from when deciding at apply-time
/// between the fast path (dependency allocation survived) and the fallback
/// (dependency escaped) in a relational decomposition (`spec.md` §4.4).
#[derive(Debug, Clone, Copy)]
pub enum BigIntOperandRef {
    Hypothetical(HypotheticalReg),
    FallbackOffset { target: RegId, offset: u32 },
}

#[derive(Debug, Clone)]
pub enum Transform {
    DeleteFastCreate {
        alloc: AllocIndex,
        block: BlockId,
        instr: usize,
    },
    GetAttrToSet {
        block: BlockId,
        instr: usize,
        dest: RegId,
        hyp_reg: HypotheticalReg,
    },
    BindAttrToSet {
        block: BlockId,
        instr: usize,
        hyp_reg: HypotheticalReg,
        value: RegId,
    },
    /// A `BindAttr` whose value is itself a still-replaceable tracked
    /// allocation: no concrete write can happen, since the value's own
    /// defining instruction is deleted. The bind becomes pure bookkeeping,
    /// already recorded as an escape dependency and shadow fact at analysis
    /// time, so the instruction itself is simply removed.
    DeleteBindAttr {
        block: BlockId,
        instr: usize,
        alloc: AllocIndex,
    },
    DeleteSet {
        block: BlockId,
        instr: usize,
    },
    /// A `GuardConcrete` proven true by a live shadow fact: the check is
    /// dead weight and the instruction is deleted outright. Liveness/def
    /// tracking for the operand register is left entirely to the tracked
    /// register table and materializer, never rewritten to a self-`Set`.
    DeleteGuard {
        block: BlockId,
        instr: usize,
        alloc: AllocIndex,
    },
    AddDeoptPoint {
        block: BlockId,
        instr: usize,
        deopt: DeoptIndex,
        alloc: AllocIndex,
    },
    AddDeoptUsage {
        deopt: DeoptIndex,
        target: TargetReg,
    },
    ProfAllocated {
        block: BlockId,
        instr: usize,
        stable: StableId,
    },
    DecomposeBigIntBinary {
        block: BlockId,
        instr: usize,
        op: BigIntBinOp,
        alloc: AllocIndex,
        lhs: BigIntOperandRef,
        rhs: BigIntOperandRef,
    },
    DecomposeBigIntUnary {
        block: BlockId,
        instr: usize,
        op: BigIntUnOp,
        alloc: AllocIndex,
        operand: BigIntOperandRef,
    },
    DecomposeBigIntRelational {
        block: BlockId,
        instr: usize,
        op: BigIntRelOp,
        lhs: BigIntOperandRef,
        rhs: BigIntOperandRef,
    },
    UnboxBigInt {
        block: BlockId,
        instr: usize,
        dest: RegId,
        hyp_reg: HypotheticalReg,
    },
    Materialize {
        id: MaterializationId,
        alloc: AllocIndex,
    },
    VivifyType {
        block: BlockId,
        instr: usize,
        hyp_reg: HypotheticalReg,
        stable: StableId,
    },
    VivifyConcrete {
        block: BlockId,
        instr: usize,
        hyp_reg: HypotheticalReg,
        prototype: StableId,
    },
    UnmaterializeBigInt {
        block: BlockId,
        instr: usize,
        alloc: AllocIndex,
        unboxed: RegId,
    },
}

impl Transform {
    /// The allocation this transform is planned on behalf of, if any. The
    /// Transformer checks this allocation's `irreplaceable` flag first and
    /// turns the transform into a no-op if it is set (`spec.md` §4.6).
    pub fn owning_allocation(&self) -> Option<AllocIndex> {
        match self {
            Transform::DeleteFastCreate { alloc, .. }
            | Transform::AddDeoptPoint { alloc, .. }
            | Transform::DecomposeBigIntBinary { alloc, .. }
            | Transform::DecomposeBigIntUnary { alloc, .. }
            | Transform::Materialize { alloc, .. }
            | Transform::UnmaterializeBigInt { alloc, .. }
            | Transform::DeleteBindAttr { alloc, .. }
            | Transform::DeleteGuard { alloc, .. } => Some(*alloc),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_list_dedups_on_push() {
        let mut target = MaterializeTarget::new();
        target.push(TargetReg::Concrete(RegId::new(1)));
        target.push(TargetReg::Concrete(RegId::new(1)));
        target.push(TargetReg::Concrete(RegId::new(2)));
        assert_eq!(target.iter().count(), 2);
    }

    #[test]
    fn empty_target_list_is_detected() {
        let target = MaterializeTarget::new();
        assert!(target.is_empty());
    }
}

//! IR instructions.
//!
//! Grounded on `darmie-rayzor`'s `IrInstruction` (`compiler/src/ir/instructions.rs`):
//! a flat enum with `dest()`/`uses()`/`has_side_effects()` inherent methods, kept
//! here but re-pointed at the opcode set `spec.md` §4.2's dispatch table and §6's
//! "opcodes enumerated across the dispatch table" actually need. Ownership-mode
//! and lifetime machinery from the teacher's general-purpose instruction set is
//! dropped: this pass's input graph has no move/borrow distinctions to preserve.

use super::{DeoptIndex, RegId, StableId, VivifyKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BigIntBinOp {
    Add,
    Sub,
    Mul,
    Gcd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BigIntUnOp {
    Neg,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BigIntRelOp {
    Cmp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The argument-sequence opcodes a materialization must never be inserted
/// inside (`spec.md` §4.5 insertion-point discipline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    ArgI,
    ArgN,
    ArgS,
    ArgO,
    ArgConstI,
    ArgConstN,
    ArgConstS,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IrInstruction {
    /// Allocates and zero-initializes an opaque object of `stable` in one shot.
    FastCreate {
        dest: RegId,
        stable: StableId,
    },
    /// A bigint-materialize op produced by an earlier pass: `dest` already
    /// holds an unboxed value from `unboxed`, wrapped in a real box of `stable`.
    BigIntMaterializeOp {
        dest: RegId,
        stable: StableId,
        unboxed: RegId,
    },
    /// Move/alias (`set`).
    Set {
        dest: RegId,
        src: RegId,
    },
    /// Writes `value` into `target`'s attribute at `offset`.
    BindAttr {
        target: RegId,
        offset: u32,
        value: RegId,
    },
    /// Plain attribute read.
    GetAttr {
        dest: RegId,
        target: RegId,
        offset: u32,
    },
    /// Auto-vivifying attribute read.
    GetAttrAutoviv {
        dest: RegId,
        target: RegId,
        offset: u32,
        vivify: VivifyKind,
    },
    /// Decontainerize: unwrap a container to its held value.
    DecontI {
        dest: RegId,
        src: RegId,
    },
    /// Concrete-type guard; deoptimizes if `operand` is not of `stable`'s type.
    GuardConcrete {
        operand: RegId,
        stable: StableId,
        deopt: Option<DeoptIndex>,
    },
    /// Boxed binary big-integer arithmetic (`add_I`, etc). `result_stable`
    /// names the boxed big-integer type the op would allocate.
    BigIntBinary {
        op: BigIntBinOp,
        dest: RegId,
        result_stable: StableId,
        lhs: RegId,
        rhs: RegId,
        deopt: Option<DeoptIndex>,
    },
    /// Boxed unary big-integer arithmetic.
    BigIntUnary {
        op: BigIntUnOp,
        dest: RegId,
        result_stable: StableId,
        operand: RegId,
        deopt: Option<DeoptIndex>,
    },
    /// Boxed big-integer relational op; result is a plain integer.
    BigIntRelational {
        op: BigIntRelOp,
        dest: RegId,
        lhs: RegId,
        rhs: RegId,
        deopt: Option<DeoptIndex>,
    },
    /// Unboxed form of `BigIntBinary` (`add_bi`, etc): operates directly on
    /// synthetic big-integer registers.
    BigIntBinaryUnboxed {
        op: BigIntBinOp,
        dest: RegId,
        lhs: RegId,
        rhs: RegId,
    },
    /// Unboxed form of `BigIntUnary`.
    BigIntUnaryUnboxed {
        op: BigIntUnOp,
        dest: RegId,
        operand: RegId,
    },
    /// Unboxed form of `BigIntRelational`.
    BigIntRelationalUnboxed {
        op: BigIntRelOp,
        dest: RegId,
        lhs: RegId,
        rhs: RegId,
    },
    /// Loads a big-integer attribute directly by offset (`get-bigint`); used
    /// when a dependency allocation escaped and the hypothetical register it
    /// would have reused never became concrete.
    GetBigInt {
        dest: RegId,
        target: RegId,
        offset: u32,
    },
    /// Replaces a `DecontI` on a tracked opaque carrying a big-integer
    /// attribute with a direct unbox of the synthetic register.
    UnboxBigInt {
        dest: RegId,
        src: RegId,
    },
    /// Profiling-allocation marker on a tracked allocation; rewritten to an
    /// "allocation replaced" event carrying the type's stable slot.
    ProfAllocated {
        operand: RegId,
        stable: StableId,
        replaced: bool,
    },
    /// Reconstructs a real heap object from synthetic attribute registers.
    MaterializeObject {
        dest: RegId,
        stable: StableId,
        attrs: Vec<(u32, RegId)>,
    },
    /// Reconstructs a real big-integer box from a synthetic unboxed value.
    /// `cache` names the integer-cache-backed stable slot the object model
    /// reports for this boxing type, if any; the codegen backend consults it
    /// at runtime before falling back to a fresh allocation.
    MaterializeBigInt {
        dest: RegId,
        unboxed: RegId,
        cache: Option<StableId>,
    },
    /// An argument-sequence element feeding the next call.
    Arg {
        kind: ArgKind,
        value: RegId,
    },
    CallDirect {
        dest: Option<RegId>,
        callee: StableId,
        args: Vec<RegId>,
        deopt: Option<DeoptIndex>,
    },
    CallIndirect {
        dest: Option<RegId>,
        callee: RegId,
        args: Vec<RegId>,
        deopt: Option<DeoptIndex>,
    },
    ReturnObject {
        value: Option<RegId>,
    },
    ReturnInt {
        value: RegId,
    },
    /// Stand-in for any opcode this pass does not specifically recognize.
    /// Reads `reads` (which may alias tracked allocations, forcing
    /// `real_object_required`) and optionally writes `dest`.
    Unhandled {
        dest: Option<RegId>,
        reads: Vec<RegId>,
    },
}

impl IrInstruction {
    pub fn dest(&self) -> Option<RegId> {
        match self {
            IrInstruction::FastCreate { dest, .. }
            | IrInstruction::BigIntMaterializeOp { dest, .. }
            | IrInstruction::Set { dest, .. }
            | IrInstruction::GetAttr { dest, .. }
            | IrInstruction::GetAttrAutoviv { dest, .. }
            | IrInstruction::DecontI { dest, .. }
            | IrInstruction::BigIntBinary { dest, .. }
            | IrInstruction::BigIntUnary { dest, .. }
            | IrInstruction::BigIntRelational { dest, .. }
            | IrInstruction::BigIntBinaryUnboxed { dest, .. }
            | IrInstruction::BigIntUnaryUnboxed { dest, .. }
            | IrInstruction::BigIntRelationalUnboxed { dest, .. }
            | IrInstruction::GetBigInt { dest, .. }
            | IrInstruction::UnboxBigInt { dest, .. }
            | IrInstruction::MaterializeObject { dest, .. }
            | IrInstruction::MaterializeBigInt { dest, .. } => Some(*dest),
            IrInstruction::CallDirect { dest, .. } | IrInstruction::CallIndirect { dest, .. } => {
                *dest
            }
            IrInstruction::Unhandled { dest, .. } => *dest,
            IrInstruction::BindAttr { .. }
            | IrInstruction::GuardConcrete { .. }
            | IrInstruction::ProfAllocated { .. }
            | IrInstruction::Arg { .. }
            | IrInstruction::ReturnObject { .. }
            | IrInstruction::ReturnInt { .. } => None,
        }
    }

    /// Every register this instruction reads.
    pub fn uses(&self) -> Vec<RegId> {
        match self {
            IrInstruction::FastCreate { .. } => Vec::new(),
            IrInstruction::ProfAllocated { operand, .. } => vec![*operand],
            IrInstruction::BigIntMaterializeOp { unboxed, .. } => vec![*unboxed],
            IrInstruction::Set { src, .. } => vec![*src],
            IrInstruction::BindAttr { target, value, .. } => vec![*target, *value],
            IrInstruction::GetAttr { target, .. } => vec![*target],
            IrInstruction::GetAttrAutoviv { target, .. } => vec![*target],
            IrInstruction::DecontI { src, .. } => vec![*src],
            IrInstruction::GuardConcrete { operand, .. } => vec![*operand],
            IrInstruction::BigIntBinary { lhs, rhs, .. }
            | IrInstruction::BigIntRelational { lhs, rhs, .. }
            | IrInstruction::BigIntBinaryUnboxed { lhs, rhs, .. }
            | IrInstruction::BigIntRelationalUnboxed { lhs, rhs, .. } => vec![*lhs, *rhs],
            IrInstruction::BigIntUnary { operand, .. }
            | IrInstruction::BigIntUnaryUnboxed { operand, .. } => vec![*operand],
            IrInstruction::GetBigInt { target, .. } => vec![*target],
            IrInstruction::UnboxBigInt { src, .. } => vec![*src],
            IrInstruction::MaterializeObject { attrs, .. } => {
                attrs.iter().map(|(_, r)| *r).collect()
            }
            IrInstruction::MaterializeBigInt { unboxed, .. } => vec![*unboxed],
            IrInstruction::Arg { value, .. } => vec![*value],
            IrInstruction::CallDirect { args, .. } => args.clone(),
            IrInstruction::CallIndirect { callee, args, .. } => {
                let mut v = vec![*callee];
                v.extend(args.iter().copied());
                v
            }
            IrInstruction::ReturnObject { value } => value.iter().copied().collect(),
            IrInstruction::ReturnInt { value } => vec![*value],
            IrInstruction::Unhandled { reads, .. } => reads.clone(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IrInstruction::ReturnObject { .. } | IrInstruction::ReturnInt { .. }
        )
    }

    /// True for opcodes that may deoptimize, per their `deopt` field.
    pub fn deopt_index(&self) -> Option<DeoptIndex> {
        match self {
            IrInstruction::GuardConcrete { deopt, .. }
            | IrInstruction::BigIntBinary { deopt, .. }
            | IrInstruction::BigIntUnary { deopt, .. }
            | IrInstruction::BigIntRelational { deopt, .. }
            | IrInstruction::CallDirect { deopt, .. }
            | IrInstruction::CallIndirect { deopt, .. } => *deopt,
            _ => None,
        }
    }

    /// True for the argument-sequence opcodes the Materialization Planner's
    /// insertion-point walk must skip over (`spec.md` §4.5).
    pub fn is_arg_opcode(&self) -> bool {
        matches!(self, IrInstruction::Arg { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fastcreate_has_no_uses() {
        let ins = IrInstruction::FastCreate {
            dest: RegId::new(0),
            stable: StableId(1),
        };
        assert!(ins.uses().is_empty());
        assert_eq!(ins.dest(), Some(RegId::new(0)));
    }

    #[test]
    fn bindattr_has_no_dest() {
        let ins = IrInstruction::BindAttr {
            target: RegId::new(0),
            offset: 8,
            value: RegId::new(1),
        };
        assert_eq!(ins.dest(), None);
        assert_eq!(ins.uses(), vec![RegId::new(0), RegId::new(1)]);
    }

    #[test]
    fn returns_are_terminators() {
        assert!(IrInstruction::ReturnInt { value: RegId::new(0) }.is_terminator());
        assert!(!IrInstruction::Set {
            dest: RegId::new(0),
            src: RegId::new(1)
        }
        .is_terminator());
    }

    #[test]
    fn arg_is_recognized_as_arg_opcode() {
        let ins = IrInstruction::Arg {
            kind: ArgKind::ArgI,
            value: RegId::new(0),
        };
        assert!(ins.is_arg_opcode());
    }
}

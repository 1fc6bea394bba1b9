//! `spec.md` §8 scenario 4: `r2 = set r1; guardconc r2, T` where `r1`'s
//! shadow facts already prove it holds a concrete `T`. The guard is proven
//! and deleted outright; `r2` keeps aliasing the allocation and picks up its
//! one real definition from the materialization the `return` triggers.

use pea::ir::{AttrKind, BlockId, ControlFlowGraph, IrInstruction, StableId, Terminator};
use pea::object_model::FakeObjectModel;
use pea::PeaConfig;

#[test]
fn proven_concrete_guard_becomes_a_set() {
    let outer_ty = StableId(1);
    let inner_ty = StableId(2);
    let model = FakeObjectModel::new()
        .with_flat_record(outer_ty, &[AttrKind::Reference])
        .with_flat_record(inner_ty, &[AttrKind::Int64]);

    let mut cfg = ControlFlowGraph::new();
    let outer = cfg.fresh_reg();
    let inner = cfg.fresh_reg();
    let r1 = cfg.fresh_reg();
    let r2 = cfg.fresh_reg();
    {
        let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
        entry.instructions.push(IrInstruction::FastCreate { dest: outer, stable: outer_ty });
        entry.instructions.push(IrInstruction::FastCreate { dest: inner, stable: inner_ty });
        entry.instructions.push(IrInstruction::BindAttr { target: outer, offset: 0, value: inner });
        entry.instructions.push(IrInstruction::GetAttr { dest: r1, target: outer, offset: 0 });
        entry.instructions.push(IrInstruction::Set { dest: r2, src: r1 });
        entry.instructions.push(IrInstruction::GuardConcrete { operand: r2, stable: inner_ty, deopt: None });
        entry.terminator = Terminator::Return { value: Some(r2) };
    }

    let config = PeaConfig::default();
    let analysis = pea::pea::analyze(&cfg, &model, &config).expect("linear chain has no back-edges");
    let report = pea::pea::transformer::apply(&mut cfg, analysis, &model);
    assert_eq!(report.transforms_skipped_irreplaceable, 0);

    let entry = cfg.get_block(BlockId::entry()).unwrap();
    assert!(
        !entry.instructions.iter().any(|i| matches!(i, IrInstruction::GuardConcrete { .. })),
        "the proven guard must be gone: {:?}",
        entry.instructions
    );
    let r2_definitions = entry
        .instructions
        .iter()
        .filter(|i| i.dest() == Some(r2))
        .count();
    assert_eq!(
        r2_definitions, 1,
        "r2 must end up defined exactly once, not left undefined or double-defined: {:?}",
        entry.instructions
    );
}

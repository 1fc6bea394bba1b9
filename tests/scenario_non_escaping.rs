//! `spec.md` §8 scenario 1: a non-escaping opaque with two int attributes.
//! `fastcreate` is deleted, both `bindattr`s become `set`s into synthetic
//! registers, the `getattr` becomes a `set`, and nothing materializes.

use pea::ir::{AttrKind, BlockId, ControlFlowGraph, IrInstruction, StableId, Terminator};
use pea::object_model::FakeObjectModel;
use pea::PeaConfig;

#[test]
fn fastcreate_deleted_binds_and_reads_become_sets() {
    let model = FakeObjectModel::new()
        .with_flat_record(StableId(1), &[AttrKind::Int64, AttrKind::Int64]);

    let mut cfg = ControlFlowGraph::new();
    let obj = cfg.fresh_reg();
    let a = cfg.fresh_reg();
    let b = cfg.fresh_reg();
    let read = cfg.fresh_reg();
    {
        let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
        entry.instructions.push(IrInstruction::FastCreate { dest: obj, stable: StableId(1) });
        entry.instructions.push(IrInstruction::BindAttr { target: obj, offset: 0, value: a });
        entry.instructions.push(IrInstruction::BindAttr { target: obj, offset: 8, value: b });
        entry.instructions.push(IrInstruction::GetAttr { dest: read, target: obj, offset: 0 });
        entry.terminator = Terminator::Return { value: Some(read) };
    }

    let config = PeaConfig::default();
    let report = pea::run(&mut cfg, &model, &config).expect("linear chain has no back-edges");
    assert_eq!(report.transforms_skipped_irreplaceable, 0);

    let entry = cfg.get_block(BlockId::entry()).unwrap();
    assert!(
        !entry.instructions.iter().any(|i| matches!(i, IrInstruction::FastCreate { .. })),
        "fastcreate should be deleted: {:?}",
        entry.instructions
    );
    assert!(
        !entry.instructions.iter().any(|i| matches!(i, IrInstruction::BindAttr { .. })),
        "bindattrs should have been rewritten to sets: {:?}",
        entry.instructions
    );
    assert!(
        !entry.instructions.iter().any(|i| matches!(i, IrInstruction::GetAttr { .. })),
        "getattr should have been rewritten to a set: {:?}",
        entry.instructions
    );
    assert!(
        !entry.instructions.iter().any(|i| matches!(i, IrInstruction::MaterializeObject { .. })),
        "a fully non-escaping allocation must never materialize: {:?}",
        entry.instructions
    );
}

//! `spec.md` §8 scenario 2: an allocation escapes through an opcode this
//! pass does not recognize. `fastcreate` is still deleted, but the object is
//! reconstructed via a materialize instruction right before the unhandled
//! consumer, and the allocation is never marked irreplaceable.

use pea::ir::{AttrKind, BlockId, ControlFlowGraph, IrInstruction, StableId, Terminator};
use pea::object_model::FakeObjectModel;
use pea::PeaConfig;

#[test]
fn unknown_consumer_forces_materialization_not_irreplaceability() {
    let model = FakeObjectModel::new()
        .with_flat_record(StableId(1), &[AttrKind::Int64, AttrKind::Int64]);

    let mut cfg = ControlFlowGraph::new();
    let obj = cfg.fresh_reg();
    let a = cfg.fresh_reg();
    let b = cfg.fresh_reg();
    {
        let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
        entry.instructions.push(IrInstruction::FastCreate { dest: obj, stable: StableId(1) });
        entry.instructions.push(IrInstruction::BindAttr { target: obj, offset: 0, value: a });
        entry.instructions.push(IrInstruction::BindAttr { target: obj, offset: 8, value: b });
        entry.instructions.push(IrInstruction::Unhandled { dest: None, reads: vec![obj] });
        entry.terminator = Terminator::Return { value: None };
    }

    let config = PeaConfig::default();
    let analysis = pea::pea::analyze(&cfg, &model, &config).expect("linear chain has no back-edges");
    assert_eq!(analysis.replaceable_count(), 1, "the allocation must stay replaceable");

    let report = pea::pea::transformer::apply(&mut cfg, analysis, &model);
    assert_eq!(report.transforms_skipped_irreplaceable, 0);

    let entry = cfg.get_block(BlockId::entry()).unwrap();
    assert!(
        !entry.instructions.iter().any(|i| matches!(i, IrInstruction::FastCreate { .. })),
        "fastcreate should still be deleted: {:?}",
        entry.instructions
    );
    let materialize_pos = entry
        .instructions
        .iter()
        .position(|i| matches!(i, IrInstruction::MaterializeObject { .. }));
    assert!(materialize_pos.is_some(), "escaping object must be reconstructed: {:?}", entry.instructions);
    let unhandled_pos = entry
        .instructions
        .iter()
        .position(|i| matches!(i, IrInstruction::Unhandled { .. }))
        .unwrap();
    assert!(
        materialize_pos.unwrap() < unhandled_pos,
        "materialize must land before its consumer: {:?}",
        entry.instructions
    );
}

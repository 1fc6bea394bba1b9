//! Partial Escape Analysis and Scalar Replacement.
//!
//! Entry point is [`run`]: analyze, then apply. A bailout (`spec.md` §7)
//! leaves `cfg` untouched — analysis never mutates the graph, so there is
//! nothing to roll back.

mod allocation;
mod bigint;
mod block_state;
mod deopt;
mod error;
mod materializer;
mod merge;
mod shadow_facts;
mod transform;

pub mod analyzer;
pub mod transformer;

#[cfg(test)]
mod tests_property;

pub use allocation::{AllocIndex, Allocation, AllocationTracker, HypotheticalReg};
pub use analyzer::{analyze, AnalysisResult};
pub use block_state::{AllocState, BlockState};
pub use deopt::{DeoptTables, MaterializeInfo, MaterializeInfoIndex};
pub use error::BailoutReason;
pub use materializer::{Materializer, MaterializationRecord};
pub use shadow_facts::{FactKey, ShadowFact, ShadowFactTable, TrackedRegisterTable};
pub use transform::{BigIntOperandRef, MaterializationId, MaterializeTarget, TargetReg, Transform};
pub use transformer::TransformReport;

use crate::config::PeaConfig;
use crate::ir::ControlFlowGraph;
use crate::object_model::ObjectModel;

/// Runs the full pass over `cfg`: analyze, then apply every surviving
/// transform. On `Err`, `cfg` is guaranteed unmodified.
pub fn run(
    cfg: &mut ControlFlowGraph,
    model: &dyn ObjectModel,
    config: &PeaConfig,
) -> Result<TransformReport, BailoutReason> {
    let analysis = analyzer::analyze(cfg, model, config)?;
    Ok(transformer::apply(cfg, analysis, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, IrInstruction, StableId, Terminator};
    use crate::object_model::FakeObjectModel;

    #[test]
    fn non_escaping_allocation_is_deleted_end_to_end() {
        let model = FakeObjectModel::new()
            .with_flat_record(StableId(1), &[crate::ir::AttrKind::Int64]);
        let mut cfg = ControlFlowGraph::new();
        let dest = cfg.fresh_reg();
        let value = cfg.fresh_reg();
        let read = cfg.fresh_reg();
        {
            let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
            entry.instructions.push(IrInstruction::FastCreate { dest, stable: StableId(1) });
            entry.instructions.push(IrInstruction::BindAttr { target: dest, offset: 0, value });
            entry.instructions.push(IrInstruction::GetAttr { dest: read, target: dest, offset: 0 });
            entry.terminator = Terminator::Return { value: Some(read) };
        }
        let config = PeaConfig::default();
        let report = run(&mut cfg, &model, &config).expect("no back-edges, pass should run");
        assert_eq!(report.transforms_skipped_irreplaceable, 0);

        let entry = cfg.get_block(BlockId::entry()).unwrap();
        assert!(
            !entry.instructions.iter().any(|i| matches!(i, IrInstruction::FastCreate { .. })),
            "fastcreate should have been deleted: {:?}",
            entry.instructions
        );
    }
}

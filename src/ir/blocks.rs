//! Basic blocks and the per-frame control-flow graph.
//!
//! Structurally this is `darmie-rayzor`'s `IrBasicBlock` / `IrControlFlowGraph`
//! (`compiler/src/ir/blocks.rs`) trimmed to what a single already-specialized
//! frame needs: no block metadata, no source locations, predecessors kept
//! explicit because the Merge Engine (`spec.md` §4.3) iterates them directly.

use super::{IrInstruction, RegId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn entry() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A phi node merging values from predecessor blocks.
#[derive(Debug, Clone)]
pub struct PhiNode {
    pub dest: RegId,
    pub incoming: Vec<(BlockId, RegId)>,
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Branch {
        target: BlockId,
    },
    CondBranch {
        condition: RegId,
        true_target: BlockId,
        false_target: BlockId,
    },
    Return {
        value: Option<RegId>,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch { target } => vec![*target],
            Terminator::CondBranch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Registers this terminator reads. A tracked allocation flowing
    /// straight into a `return` or branch condition without an intervening
    /// instruction still counts as a consumer (`spec.md` §4.2 step 4).
    pub fn uses(&self) -> Vec<RegId> {
        match self {
            Terminator::Branch { .. } | Terminator::Unreachable => Vec::new(),
            Terminator::CondBranch { condition, .. } => vec![*condition],
            Terminator::Return { value } => value.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub phi_nodes: Vec<PhiNode>,
    pub instructions: Vec<IrInstruction>,
    pub terminator: Terminator,
    pub predecessors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            phi_nodes: Vec::new(),
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
            predecessors: Vec::new(),
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator.successors()
    }
}

/// The SSA graph for a single frame.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub blocks: HashMap<BlockId, BasicBlock>,
    pub entry_block: BlockId,
    pub next_block_id: u32,
    pub next_reg_id: u32,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        let entry_block = BlockId::entry();
        let mut blocks = HashMap::new();
        blocks.insert(entry_block, BasicBlock::new(entry_block));
        Self {
            blocks,
            entry_block,
            next_block_id: 1,
            next_reg_id: 0,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    pub fn fresh_reg(&mut self) -> RegId {
        let id = RegId::new(self.next_reg_id);
        self.next_reg_id += 1;
        id
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    pub fn connect_blocks(&mut self, from: BlockId, to: BlockId) {
        if let Some(block) = self.blocks.get_mut(&to) {
            if !block.predecessors.contains(&from) {
                block.predecessors.push(from);
            }
        }
    }

    /// All block ids, in ascending order. Used by passes that want a
    /// deterministic fallback walk order when RPO hasn't been computed yet.
    pub fn block_ids_sorted(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_blocks_records_predecessor() {
        let mut cfg = ControlFlowGraph::new();
        let bb1 = cfg.create_block();
        cfg.connect_blocks(BlockId::entry(), bb1);
        assert_eq!(
            cfg.get_block(bb1).unwrap().predecessors,
            vec![BlockId::entry()]
        );
    }

    #[test]
    fn fresh_reg_increments() {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.fresh_reg();
        let b = cfg.fresh_reg();
        assert_ne!(a, b);
    }

    #[test]
    fn cond_branch_successors() {
        let mut cfg = ControlFlowGraph::new();
        let bb1 = cfg.create_block();
        let bb2 = cfg.create_block();
        let entry = cfg.get_block_mut(BlockId::entry()).unwrap();
        entry.terminator = Terminator::CondBranch {
            condition: RegId::new(0),
            true_target: bb1,
            false_target: bb2,
        };
        let succs = cfg.get_block(BlockId::entry()).unwrap().successors();
        assert_eq!(succs, vec![bb1, bb2]);
    }
}

//! Control-flow graph utilities.

use crate::ir::model::{BlockId, Function, Terminator};

/// Control-flow graph for a single function.
pub struct Cfg {
    entry: BlockId,
    blocks: Vec<BlockId>,
    preds: Vec<Vec<BlockId>>,
    succs: Vec<Vec<BlockId>>,
}

impl Cfg {
    pub fn new(func: &Function) -> Self {
        let mut blocks = Vec::with_capacity(func.blocks.len());
        for block in &func.blocks {
            blocks.push(block.id);
        }

        let entry = blocks.first().copied().unwrap_or(BlockId(0));
        let mut preds = vec![Vec::new(); blocks.len()];
        let mut succs = vec![Vec::new(); blocks.len()];

        for block in &func.blocks {
            let mut block_succs = Vec::new();
            match &block.term {
                Terminator::Br { target } => {
                    push_unique(&mut block_succs, *target);
                }
                Terminator::CondBr {
                    then_bb, else_bb, ..
                } => {
                    push_unique(&mut block_succs, *then_bb);
                    push_unique(&mut block_succs, *else_bb);
                }
                Terminator::IndirectBr { targets, .. } => {
                    for target in targets {
                        push_unique(&mut block_succs, *target);
                    }
                }
                Terminator::Return { .. } | Terminator::Unreachable => {}
            }

            for succ in &block_succs {
                push_unique(&mut preds[succ.index()], block.id);
            }

            succs[block.id.index()] = block_succs;
        }

        Self {
            entry,
            blocks,
            preds,
            succs,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block.index()]
    }

    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.succs[block.index()]
    }

    /// Returns reverse postorder for the reachable portion of the CFG.
    pub fn rpo(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Returns postorder for the reachable portion of the CFG. Iterative so
    /// that pathological block chains cannot overflow the stack.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        if self.blocks.is_empty() {
            return order;
        }

        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited[self.entry.index()] = true;
        while let Some((block, next)) = stack.last_mut() {
            let succs = &self.succs[block.index()];
            if *next < succs.len() {
                let succ = succs[*next];
                *next += 1;
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(*block);
                stack.pop();
            }
        }
        order
    }
}

fn push_unique(list: &mut Vec<BlockId>, block: BlockId) {
    if !list.contains(&block) {
        list.push(block);
    }
}

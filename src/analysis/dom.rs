//! Dominator tree and dominance frontiers.
//!
//! Immediate dominators are computed by the iterative reverse-postorder
//! intersection scheme; `dominates` walks the idom chain. Unreachable blocks
//! have no dominator information and answer `false` to every query.

use crate::analysis::cfg::Cfg;
use crate::ir::model::BlockId;

pub struct DomTree {
    /// Immediate dominator per block index. The entry maps to itself;
    /// unreachable blocks map to `None`.
    idom: Vec<Option<BlockId>>,
    /// Reverse-postorder number per block index, `usize::MAX` if unreachable.
    rpo_number: Vec<usize>,
    entry: BlockId,
}

impl DomTree {
    pub fn new(cfg: &Cfg) -> Self {
        let num_blocks = cfg.num_blocks();
        let rpo = cfg.rpo();
        let mut rpo_number = vec![usize::MAX; num_blocks];
        for (number, block) in rpo.iter().enumerate() {
            rpo_number[block.index()] = number;
        }

        let entry = cfg.entry();
        let mut idom: Vec<Option<BlockId>> = vec![None; num_blocks];
        if num_blocks == 0 {
            return Self {
                idom,
                rpo_number,
                entry,
            };
        }
        idom[entry.index()] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in cfg.preds(block) {
                    if idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_number, pred, current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom[block.index()] != Some(new_idom) {
                        idom[block.index()] = Some(new_idom);
                        changed = true;
                    }
                }
            }
        }

        Self {
            idom,
            rpo_number,
            entry,
        }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom[block.index()].is_some()
    }

    /// Immediate dominator, `None` for the entry and for unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            return None;
        }
        self.idom[block.index()]
    }

    /// Whether `a` strictly-or-reflexively dominates `b`. Unreachable blocks
    /// dominate nothing and are dominated by nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut runner = b;
        loop {
            if runner == a {
                return true;
            }
            if runner == self.entry {
                return false;
            }
            runner = self.idom[runner.index()].unwrap_or_else(|| {
                panic!("reachable block bb{} has no immediate dominator", runner.0)
            });
        }
    }

    /// Dominance frontier per block index: the blocks where a definition in
    /// the keyed block stops dominating and a merge is required.
    pub fn frontier(&self, cfg: &Cfg) -> Vec<Vec<BlockId>> {
        let mut frontier: Vec<Vec<BlockId>> = vec![Vec::new(); cfg.num_blocks()];
        for &block in cfg.blocks() {
            if !self.is_reachable(block) {
                continue;
            }
            let preds = cfg.preds(block);
            if preds.len() < 2 {
                continue;
            }
            let Some(idom) = self.idom(block) else {
                continue;
            };
            for &pred in preds {
                if !self.is_reachable(pred) {
                    continue;
                }
                let mut runner = pred;
                while runner != idom {
                    let list = &mut frontier[runner.index()];
                    if !list.contains(&block) {
                        list.push(block);
                    }
                    if runner == self.entry {
                        break;
                    }
                    runner = self.idom[runner.index()].unwrap_or_else(|| {
                        panic!("reachable block bb{} has no immediate dominator", runner.0)
                    });
                }
            }
        }
        frontier
    }
}

fn intersect(
    idom: &[Option<BlockId>],
    rpo_number: &[usize],
    a: BlockId,
    b: BlockId,
) -> BlockId {
    let mut a = a;
    let mut b = b;
    while a != b {
        while rpo_number[a.index()] > rpo_number[b.index()] {
            a = idom[a.index()].unwrap_or_else(|| {
                panic!("block bb{} visited before its dominator was set", a.0)
            });
        }
        while rpo_number[b.index()] > rpo_number[a.index()] {
            b = idom[b.index()].unwrap_or_else(|| {
                panic!("block bb{} visited before its dominator was set", b.0)
            });
        }
    }
    a
}

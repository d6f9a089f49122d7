//! Natural-loop detection and the loop nesting forest.
//!
//! A back edge is an edge `tail -> header` where the header dominates the
//! tail. The loop body is everything that reaches a latch backwards without
//! passing through the header. Loops sharing a header are merged. Nesting
//! follows from body inclusion; each block knows its innermost loop.

use indexmap::{IndexMap, IndexSet};

use crate::analysis::cfg::Cfg;
use crate::analysis::dom::DomTree;
use crate::ir::model::{BlockId, Function, Terminator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

impl LoopId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Loop {
    pub header: BlockId,
    /// Member blocks, header first, in discovery order.
    pub blocks: IndexSet<BlockId>,
    /// Sources of back edges into the header.
    pub latches: Vec<BlockId>,
    pub parent: Option<LoopId>,
    pub children: Vec<LoopId>,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// The dedicated preheader: the unique predecessor of the header outside
    /// the loop, ending in an unconditional branch to the header. `None`
    /// means the loop is not in simplified form and must be skipped by any
    /// pass that hoists into the preheader.
    pub fn preheader(&self, cfg: &Cfg, func: &Function) -> Option<BlockId> {
        let mut outside = cfg
            .preds(self.header)
            .iter()
            .filter(|pred| !self.contains(**pred));
        let candidate = *outside.next()?;
        if outside.next().is_some() {
            return None;
        }
        match &func.block(candidate).term {
            Terminator::Br { target } if *target == self.header => Some(candidate),
            _ => None,
        }
    }
}

pub struct LoopForest {
    loops: Vec<Loop>,
    /// Innermost enclosing loop per block index.
    innermost: Vec<Option<LoopId>>,
}

impl LoopForest {
    pub fn new(cfg: &Cfg, dom: &DomTree) -> Self {
        // Back edges, grouped by header in discovery order.
        let mut latches_by_header: IndexMap<BlockId, Vec<BlockId>> = IndexMap::new();
        for &tail in cfg.blocks() {
            if !dom.is_reachable(tail) {
                continue;
            }
            for &head in cfg.succs(tail) {
                if dom.dominates(head, tail) {
                    latches_by_header.entry(head).or_default().push(tail);
                }
            }
        }

        let mut loops = Vec::with_capacity(latches_by_header.len());
        for (header, latches) in latches_by_header {
            let blocks = loop_body(cfg, header, &latches);
            loops.push(Loop {
                header,
                blocks,
                latches,
                parent: None,
                children: Vec::new(),
            });
        }

        // Nesting: process loops largest-first so that by the time a loop is
        // seen, every strictly enclosing loop has already claimed its blocks.
        let mut by_size: Vec<usize> = (0..loops.len()).collect();
        by_size.sort_by_key(|&index| std::cmp::Reverse(loops[index].blocks.len()));

        let mut innermost: Vec<Option<LoopId>> = vec![None; cfg.num_blocks()];
        for &index in &by_size {
            let id = LoopId(index as u32);
            let parent = innermost[loops[index].header.index()];
            loops[index].parent = parent;
            for block in loops[index].blocks.clone() {
                innermost[block.index()] = Some(id);
            }
        }
        for index in 0..loops.len() {
            if let Some(parent) = loops[index].parent {
                loops[parent.index()].children.push(LoopId(index as u32));
            }
        }

        Self { loops, innermost }
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        self.loops
            .get(id.index())
            .unwrap_or_else(|| panic!("invalid loop id {:?}", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LoopId, &Loop)> {
        self.loops
            .iter()
            .enumerate()
            .map(|(index, lp)| (LoopId(index as u32), lp))
    }

    /// Innermost loop containing the block, if any.
    pub fn innermost(&self, block: BlockId) -> Option<LoopId> {
        self.innermost.get(block.index()).copied().flatten()
    }

    /// Every loop, each child strictly before its ancestors. Computed with an
    /// explicit stack: nesting depth must not be limited by the call stack.
    pub fn innermost_first(&self) -> Vec<LoopId> {
        let mut order = Vec::with_capacity(self.loops.len());
        let roots = self
            .iter()
            .filter(|(_, lp)| lp.parent.is_none())
            .map(|(id, _)| id);
        let mut stack: Vec<(LoopId, usize)> = Vec::new();
        for root in roots {
            stack.push((root, 0));
            while let Some((id, next_child)) = stack.last_mut() {
                let children = &self.get(*id).children;
                if *next_child < children.len() {
                    let child = children[*next_child];
                    *next_child += 1;
                    stack.push((child, 0));
                } else {
                    order.push(*id);
                    stack.pop();
                }
            }
        }
        order
    }
}

fn loop_body(cfg: &Cfg, header: BlockId, latches: &[BlockId]) -> IndexSet<BlockId> {
    let mut body = IndexSet::new();
    body.insert(header);

    let mut worklist: Vec<BlockId> = Vec::new();
    for &latch in latches {
        if body.insert(latch) {
            worklist.push(latch);
        }
    }
    while let Some(block) = worklist.pop() {
        for &pred in cfg.preds(block) {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    body
}

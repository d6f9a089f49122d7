//! Loop-invariant code motion.
//!
//! Relocates instructions whose value cannot change across a loop's
//! iterations from the loop body into the loop preheader, so they run once
//! per loop entry instead of once per iteration. The pass never creates or
//! deletes instructions or blocks; its only mutation is moving instructions
//! between blocks.
//!
//! Loops are visited innermost-first. An instruction belongs to exactly one
//! loop (its innermost enclosing one), and only that loop may move it: once
//! hoisted into an inner preheader, the instruction sits in the enclosing
//! loop's body and is reconsidered when that loop is visited.

use std::collections::HashSet;

use crate::analysis::cfg::Cfg;
use crate::analysis::dom::DomTree;
use crate::analysis::invariance;
use crate::analysis::loops::{LoopForest, LoopId};
use crate::ir::model::*;
use crate::opt::{simplify, Pass, PassResult};

pub struct Licm;

impl Pass for Licm {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn run(&mut self, func: &mut Function) -> PassResult {
        if func.blocks.is_empty() {
            // External declaration.
            return PassResult::Preserved;
        }

        // Loops must be in simplified form before any hoisting.
        simplify::simplify_loops(func);

        let cfg = Cfg::new(func);
        let dom = DomTree::new(&cfg);
        let forest = LoopForest::new(&cfg, &dom);
        if forest.is_empty() {
            return PassResult::Preserved;
        }

        for id in forest.innermost_first() {
            // Simplification can fail for an individual loop (e.g. a header
            // entered through an indirect branch); leave such loops alone.
            let Some(preheader) = forest.get(id).preheader(&cfg, func) else {
                log::debug!(
                    "licm: loop at bb{} in {} is not in simplified form, skipping",
                    forest.get(id).header.0,
                    func.name
                );
                continue;
            };
            hoist_loop(func, &forest, id, preheader);
        }

        // Code moved between blocks (or at least the traversal ran); any
        // dominance, loop, or liveness information computed earlier is stale.
        PassResult::Invalidated
    }
}

fn hoist_loop(func: &mut Function, forest: &LoopForest, id: LoopId, preheader: BlockId) {
    let lp = forest.get(id);

    // The oracle is queried against the current state of the function:
    // instructions already hoisted out of a nested loop sit in that loop's
    // preheader now and count as members here.
    let invariant = invariance::invariant_values(func, lp);
    if invariant.is_empty() {
        return;
    }

    // Blocks are scanned in layout order, which fixes the candidates'
    // relative order: a producer precedes its consumers in valid input, so
    // moving them in discovery order keeps definitions ahead of uses.
    let mut hoisted: Vec<Instruction> = Vec::new();
    for index in 0..func.blocks.len() {
        let block_id = func.blocks[index].id;
        // Blocks owned by a nested loop are that loop's responsibility.
        if forest.innermost(block_id) != Some(id) {
            continue;
        }
        let block = &mut func.blocks[index];
        let mut kept = Vec::with_capacity(block.insts.len());
        for inst in block.insts.drain(..) {
            if is_candidate(&inst, &invariant) {
                hoisted.push(inst);
            } else {
                kept.push(inst);
            }
        }
        block.insts = kept;
    }

    if hoisted.is_empty() {
        return;
    }
    log::debug!(
        "licm: hoisted {} instruction(s) into bb{} in {}",
        hoisted.len(),
        preheader.0,
        func.name
    );
    // Into the preheader, directly ahead of its branch to the header.
    func.block_mut(preheader).insts.extend(hoisted);
}

fn is_candidate(inst: &Instruction, invariant: &HashSet<ValueId>) -> bool {
    // A phi's value depends on which predecessor ran, not only on its
    // operands; the oracle cannot see that, so its verdict for phis is
    // overridden here, unconditionally.
    if inst.is_phi() {
        return false;
    }
    match &inst.result {
        Some(result) => invariant.contains(&result.id),
        None => false,
    }
}

//! Loop canonicalization: dedicated preheaders.
//!
//! Rewrites every natural loop into simplified form, where the header has a
//! single out-of-loop predecessor that branches to it unconditionally. Later
//! passes hoist into that block.
//!
//! Simplification can legitimately fail for an individual loop:
//! - an out-of-loop predecessor ending in an indirect branch has computed
//!   edges that cannot be redirected;
//! - a loop headed by the function entry block has no incoming edge to
//!   reroute.
//! Such loops are simply left alone; passes that need simplified form skip
//! them.

use crate::analysis::cfg::Cfg;
use crate::analysis::dom::DomTree;
use crate::analysis::loops::{Loop, LoopForest};
use crate::ir::model::*;
use crate::opt::{Pass, PassResult};

pub struct LoopSimplify;

impl Pass for LoopSimplify {
    fn name(&self) -> &'static str {
        "loop-simplify"
    }

    fn run(&mut self, func: &mut Function) -> PassResult {
        if func.blocks.is_empty() {
            return PassResult::Preserved;
        }
        if simplify_loops(func) {
            PassResult::Invalidated
        } else {
            PassResult::Preserved
        }
    }
}

/// Inserts preheaders until every loop that can be simplified is. Returns
/// whether the function changed. Analyses are recomputed after each
/// insertion; a new preheader may join the body of an enclosing loop.
pub(crate) fn simplify_loops(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let cfg = Cfg::new(func);
        let dom = DomTree::new(&cfg);
        let forest = LoopForest::new(&cfg, &dom);

        let mut inserted = false;
        for (_, lp) in forest.iter() {
            if lp.preheader(&cfg, func).is_some() {
                continue;
            }
            if insert_preheader(func, lp, &cfg) {
                changed = true;
                inserted = true;
                break;
            }
        }
        if !inserted {
            return changed;
        }
    }
}

fn insert_preheader(func: &mut Function, lp: &Loop, cfg: &Cfg) -> bool {
    let header = lp.header;
    let outside: Vec<BlockId> = cfg
        .preds(header)
        .iter()
        .copied()
        .filter(|pred| !lp.contains(*pred))
        .collect();

    if outside.is_empty() {
        // Loop headed by the function entry; there is no edge to reroute.
        log::debug!(
            "loop-simplify: loop at bb{} in {} is headed by the entry block, leaving it",
            header.0,
            func.name
        );
        return false;
    }
    if outside
        .iter()
        .any(|pred| matches!(func.block(*pred).term, Terminator::IndirectBr { .. }))
    {
        log::debug!(
            "loop-simplify: loop at bb{} in {} is entered through an indirect branch, leaving it",
            header.0,
            func.name
        );
        return false;
    }

    let preheader = func.new_block();
    for &pred in &outside {
        func.block_mut(pred).term.for_each_target_mut(|target| {
            if *target == header {
                *target = preheader;
            }
        });
    }

    // Header phis: incomings from the rerouted predecessors now arrive
    // through the preheader. Differing entry values need a merge phi there.
    struct Rewire {
        at: usize,
        ty: Type,
        kept: Vec<PhiIncoming>,
        entering: Vec<PhiIncoming>,
    }

    let mut rewires = Vec::new();
    for (at, inst) in func.block(header).insts.iter().enumerate() {
        let InstKind::Phi { incomings } = &inst.kind else {
            break;
        };
        let Some(result) = inst.result else {
            continue;
        };
        let (entering, kept): (Vec<_>, Vec<_>) = incomings
            .iter()
            .copied()
            .partition(|incoming| outside.contains(&incoming.pred));
        rewires.push(Rewire {
            at,
            ty: result.ty,
            kept,
            entering,
        });
    }

    let mut preheader_phis = Vec::new();
    for rewire in rewires {
        let entry_value = match rewire.entering.as_slice() {
            [] => None,
            [first, rest @ ..] if rest.iter().all(|i| i.value == first.value) => {
                Some(first.value)
            }
            entering => {
                let def = func.new_value(rewire.ty);
                preheader_phis.push(Instruction {
                    result: Some(def),
                    kind: InstKind::Phi {
                        incomings: entering.to_vec(),
                    },
                });
                Some(def.id)
            }
        };
        let block = func.block_mut(header);
        let InstKind::Phi { incomings } = &mut block.insts[rewire.at].kind else {
            continue;
        };
        *incomings = rewire.kept;
        if let Some(value) = entry_value {
            incomings.push(PhiIncoming {
                pred: preheader,
                value,
            });
        }
    }

    let block = func.block_mut(preheader);
    block.insts = preheader_phis;
    block.term = Terminator::Br { target: header };

    log::debug!(
        "loop-simplify: inserted preheader bb{} for loop at bb{} in {}",
        preheader.0,
        header.0,
        func.name
    );
    true
}

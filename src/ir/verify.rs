//! Structural verifier for the IR.
//!
//! Checks the SSA well-formedness the optimization passes rely on: unique
//! definitions, no uses of undefined values, definitions dominating their
//! uses, valid branch targets, and phi incoming lists that exactly mirror
//! the block's predecessors.

use std::collections::HashMap;

use thiserror::Error;

use crate::analysis::cfg::Cfg;
use crate::analysis::dom::DomTree;
use crate::ir::model::*;

#[derive(Debug, Clone, Error)]
#[error("{func}: {message}")]
pub struct VerifyError {
    func: String,
    message: String,
}

impl VerifyError {
    fn new(func: &str, message: impl Into<String>) -> Self {
        Self {
            func: func.to_string(),
            message: message.into(),
        }
    }
}

/// Definition point of a value: a function parameter or an instruction slot.
#[derive(Clone, Copy)]
enum DefSite {
    Param,
    Inst { block: BlockId, at: usize },
}

/// Where a value is read: at an instruction slot, or on a block's outgoing
/// edge (terminator operands and phi incomings).
#[derive(Clone, Copy)]
enum UsePoint {
    Inst { block: BlockId, at: usize },
    BlockExit(BlockId),
}

pub fn verify_func(func: &Function) -> Result<(), VerifyError> {
    let name = func.name.as_str();

    if func.blocks.is_empty() {
        // External declaration; nothing to check.
        return Ok(());
    }

    for (index, block) in func.blocks.iter().enumerate() {
        if block.id.index() != index {
            return Err(VerifyError::new(
                name,
                format!("block bb{} out of place at index {}", block.id.0, index),
            ));
        }
    }

    let mut defs: HashMap<ValueId, DefSite> = HashMap::new();
    for param in &func.params {
        if defs.insert(param.id, DefSite::Param).is_some() {
            return Err(VerifyError::new(
                name,
                format!("duplicate definition of %v{}", param.id.0),
            ));
        }
    }
    for block in &func.blocks {
        for (at, inst) in block.insts.iter().enumerate() {
            if let Some(result) = &inst.result {
                let site = DefSite::Inst {
                    block: block.id,
                    at,
                };
                if defs.insert(result.id, site).is_some() {
                    return Err(VerifyError::new(
                        name,
                        format!("duplicate definition of %v{}", result.id.0),
                    ));
                }
            }
        }
    }

    let cfg = Cfg::new(func);
    let dom = DomTree::new(&cfg);

    for block in &func.blocks {
        verify_block_structure(name, func, &cfg, &dom, block)?;
    }

    // Use checks. Dominance is only meaningful for reachable code; dead
    // blocks are left to whatever pass removes them.
    for block in &func.blocks {
        let reachable = dom.is_reachable(block.id);
        for (at, inst) in block.insts.iter().enumerate() {
            if let InstKind::Phi { incomings } = &inst.kind {
                for incoming in incomings {
                    // A phi reads its incoming on the edge, so the def must
                    // be available at the predecessor's exit. Edges from
                    // dead predecessors never run and are not constrained.
                    check_use(
                        name,
                        &dom,
                        &defs,
                        incoming.value,
                        UsePoint::BlockExit(incoming.pred),
                        dom.is_reachable(incoming.pred),
                    )?;
                }
            } else {
                let mut err = None;
                for_each_use(&inst.kind, |value| {
                    if err.is_none() {
                        err = check_use(
                            name,
                            &dom,
                            &defs,
                            value,
                            UsePoint::Inst {
                                block: block.id,
                                at,
                            },
                            reachable,
                        )
                        .err();
                    }
                });
                if let Some(err) = err {
                    return Err(err);
                }
            }
        }
        let mut err = None;
        block.term.for_each_use(|value| {
            if err.is_none() {
                err = check_use(
                    name,
                    &dom,
                    &defs,
                    value,
                    UsePoint::BlockExit(block.id),
                    reachable,
                )
                .err();
            }
        });
        if let Some(err) = err {
            return Err(err);
        }
    }

    Ok(())
}

fn verify_block_structure(
    name: &str,
    func: &Function,
    cfg: &Cfg,
    dom: &DomTree,
    block: &Block,
) -> Result<(), VerifyError> {
    let mut past_phis = false;
    for inst in &block.insts {
        if inst.is_phi() {
            if past_phis {
                return Err(VerifyError::new(
                    name,
                    format!("phi below non-phi instruction in bb{}", block.id.0),
                ));
            }
        } else {
            past_phis = true;
        }

        if let InstKind::Phi { incomings } = &inst.kind {
            verify_phi(name, cfg, dom, block.id, incomings)?;
        }

        if let InstKind::AddrOfLocal { local } = &inst.kind {
            if local.index() >= func.locals.len() {
                return Err(VerifyError::new(
                    name,
                    format!("reference to undeclared local %l{}", local.0),
                ));
            }
        }
    }

    for target in terminator_targets(&block.term) {
        if target.index() >= func.blocks.len() {
            return Err(VerifyError::new(
                name,
                format!("bb{} branches to undeclared bb{}", block.id.0, target.0),
            ));
        }
        // The entry has an implicit incoming edge with no predecessor
        // block, so a merge there could never name all of its sources.
        if target == cfg.entry() {
            return Err(VerifyError::new(
                name,
                format!("bb{} branches to the entry block", block.id.0),
            ));
        }
    }

    Ok(())
}

fn terminator_targets(term: &Terminator) -> Vec<BlockId> {
    match term {
        Terminator::Br { target } => vec![*target],
        Terminator::CondBr {
            then_bb, else_bb, ..
        } => vec![*then_bb, *else_bb],
        Terminator::IndirectBr { targets, .. } => targets.clone(),
        Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
    }
}

fn verify_phi(
    name: &str,
    cfg: &Cfg,
    dom: &DomTree,
    block: BlockId,
    incomings: &[PhiIncoming],
) -> Result<(), VerifyError> {
    let preds = cfg.preds(block);
    for incoming in incomings {
        if !preds.contains(&incoming.pred) {
            return Err(VerifyError::new(
                name,
                format!(
                    "phi in bb{} names bb{}, which is not a predecessor",
                    block.0, incoming.pred.0
                ),
            ));
        }
    }
    // Every live edge needs exactly one value; edges from dead blocks are
    // exempt (nothing ever arrives along them).
    for pred in preds {
        if !dom.is_reachable(*pred) {
            continue;
        }
        let count = incomings.iter().filter(|i| i.pred == *pred).count();
        if count != 1 {
            return Err(VerifyError::new(
                name,
                format!(
                    "phi in bb{} has {} incomings for predecessor bb{}",
                    block.0, count, pred.0
                ),
            ));
        }
    }
    Ok(())
}

fn check_use(
    name: &str,
    dom: &DomTree,
    defs: &HashMap<ValueId, DefSite>,
    value: ValueId,
    point: UsePoint,
    use_block_reachable: bool,
) -> Result<(), VerifyError> {
    let Some(site) = defs.get(&value) else {
        return Err(VerifyError::new(
            name,
            format!("use of undefined value %v{}", value.0),
        ));
    };
    if !use_block_reachable {
        return Ok(());
    }
    let DefSite::Inst {
        block: def_block,
        at: def_at,
    } = *site
    else {
        // Params dominate everything.
        return Ok(());
    };
    let dominated = match point {
        UsePoint::Inst { block, at } => {
            if block == def_block {
                def_at < at
            } else {
                dom.dominates(def_block, block)
            }
        }
        UsePoint::BlockExit(block) => def_block == block || dom.dominates(def_block, block),
    };
    if !dominated {
        return Err(VerifyError::new(
            name,
            format!(
                "definition of %v{} in bb{} does not dominate its use",
                value.0, def_block.0
            ),
        ));
    }
    Ok(())
}

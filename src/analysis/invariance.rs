//! Loop-invariance oracle.
//!
//! Decides, per loop, which values are provably identical across all of the
//! loop's iterations. The computation is a fixed point: a result is invariant
//! when its defining instruction is effect-free and non-trapping and every
//! operand is either defined outside the loop or already known invariant,
//! bottoming out at constants and values that enter the loop from above.
//!
//! The oracle reasons about values only. In particular a phi whose incoming
//! values are all invariant is reported invariant even though relocating it
//! would be unsound: which incoming is selected depends on control flow, not
//! on the operand values. Rejecting phis is the motion engine's policy, not
//! the oracle's.
//!
//! Everything uncertain is not-invariant:
//! - stores and calls have (or may have) effects;
//! - a load's value depends on memory state, and there is no alias analysis
//!   to consult;
//! - division and remainder can fault, so they only qualify when the divisor
//!   is a constant known non-zero (relocation must not introduce a fault on
//!   an iteration that never executed one).

use std::collections::{HashMap, HashSet};

use crate::analysis::loops::Loop;
use crate::ir::model::*;

/// The set of values defined inside `lp` whose results are provably
/// loop-invariant with respect to `lp`, given the current state of `func`.
/// Verdicts are transient; callers re-query after mutating the IR.
pub fn invariant_values(func: &Function, lp: &Loop) -> HashSet<ValueId> {
    let mut defs_in_loop: HashMap<ValueId, &InstKind> = HashMap::new();
    for block in &func.blocks {
        if !lp.contains(block.id) {
            continue;
        }
        for inst in &block.insts {
            if let Some(result) = &inst.result {
                defs_in_loop.insert(result.id, &inst.kind);
            }
        }
    }

    let consts = const_ints(func);

    let mut invariant: HashSet<ValueId> = HashSet::new();
    loop {
        let mut changed = false;
        for block in &func.blocks {
            if !lp.contains(block.id) {
                continue;
            }
            for inst in &block.insts {
                let Some(result) = &inst.result else {
                    continue;
                };
                if invariant.contains(&result.id) {
                    continue;
                }
                if !eligible(&inst.kind, &consts) {
                    continue;
                }
                let mut operands_invariant = true;
                for_each_use(&inst.kind, |value| {
                    if defs_in_loop.contains_key(&value) && !invariant.contains(&value) {
                        operands_invariant = false;
                    }
                });
                if operands_invariant {
                    invariant.insert(result.id);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    invariant
}

/// Single-instruction convenience query over [`invariant_values`].
pub fn is_invariant(func: &Function, lp: &Loop, inst: &Instruction) -> bool {
    match &inst.result {
        Some(result) => invariant_values(func, lp).contains(&result.id),
        None => false,
    }
}

fn eligible(kind: &InstKind, consts: &HashMap<ValueId, i64>) -> bool {
    if has_side_effects(kind) {
        return false;
    }
    match kind {
        InstKind::Load { .. } => false,
        InstKind::BinOp { op, rhs, .. } if op.can_trap() => {
            matches!(consts.get(rhs), Some(divisor) if *divisor != 0)
        }
        _ => true,
    }
}

/// Integer constants defined anywhere in the function, for divisor checks.
fn const_ints(func: &Function) -> HashMap<ValueId, i64> {
    let mut consts = HashMap::new();
    for block in &func.blocks {
        for inst in &block.insts {
            if let (
                Some(result),
                InstKind::Const {
                    value: ConstValue::Int(value),
                },
            ) = (&inst.result, &inst.kind)
            {
                consts.insert(result.id, *value);
            }
        }
    }
    consts
}

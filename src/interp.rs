//! Reference interpreter for the IR.
//!
//! Executes a function deterministically and reports everything observable
//! about the run: the returned value, the ordered log of external calls, and
//! any trap. Transformation tests execute a function before and after a pass
//! and require identical outcomes.
//!
//! Arithmetic is 64-bit two's-complement regardless of the declared integer
//! width; calls are opaque events returning a zero of their declared type.
//! The interpreter expects verified IR and treats violations (type mismatch,
//! unknown value) as caller bugs.

use std::collections::HashMap;

use thiserror::Error;

use crate::ir::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Ptr(LocalId),
}

impl Value {
    fn zero_of(ty: Type) -> Value {
        match ty {
            Type::Unit => Value::Unit,
            Type::Bool => Value::Bool(false),
            Type::Int { .. } => Value::Int(0),
            Type::Ptr => Value::Ptr(LocalId(0)),
        }
    }

    fn as_int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            other => panic!("expected integer value, found {:?}", other),
        }
    }

    fn as_bool(self) -> bool {
        match self {
            Value::Bool(v) => v,
            other => panic!("expected boolean value, found {:?}", other),
        }
    }

    fn as_ptr(self) -> LocalId {
        match self {
            Value::Ptr(local) => local,
            other => panic!("expected pointer value, found {:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub callee: String,
    pub args: Vec<Value>,
}

/// Everything observable about one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub ret: Option<Value>,
    pub calls: Vec<CallEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivideByZero,
    #[error("indirect branch index {0} out of range")]
    BadIndirectTarget(i64),
    #[error("executed `unreachable`")]
    ReachedUnreachable,
    #[error("ran out of fuel")]
    OutOfFuel,
    #[error("expected {expected} argument(s), got {got}")]
    BadArity { expected: usize, got: usize },
    #[error("function has no body")]
    NoBody,
}

pub const DEFAULT_FUEL: u64 = 1_000_000;

pub fn run(func: &Function, args: &[Value]) -> Result<Outcome, EvalError> {
    run_with_fuel(func, args, DEFAULT_FUEL)
}

pub fn run_with_fuel(func: &Function, args: &[Value], fuel: u64) -> Result<Outcome, EvalError> {
    if func.params.len() != args.len() {
        return Err(EvalError::BadArity {
            expected: func.params.len(),
            got: args.len(),
        });
    }
    let Some(entry) = func.entry() else {
        return Err(EvalError::NoBody);
    };

    let mut regs: HashMap<ValueId, Value> = HashMap::new();
    for (param, arg) in func.params.iter().zip(args) {
        regs.insert(param.id, *arg);
    }
    let mut memory: Vec<Value> = func
        .locals
        .iter()
        .map(|local| Value::zero_of(local.ty))
        .collect();
    let mut calls: Vec<CallEvent> = Vec::new();

    let mut fuel = fuel;
    let mut block_id = entry;
    let mut prev: Option<BlockId> = None;
    loop {
        let block = func.block(block_id);

        // Phis read their incomings simultaneously, before any of them
        // writes: an incoming may name another phi of the same block.
        let phi_count = block.insts.iter().take_while(|inst| inst.is_phi()).count();
        let mut phi_writes: Vec<(ValueId, Value)> = Vec::with_capacity(phi_count);
        for inst in &block.insts[..phi_count] {
            let InstKind::Phi { incomings } = &inst.kind else {
                continue;
            };
            let pred = prev.unwrap_or_else(|| panic!("phi in entry block bb{}", block_id.0));
            let incoming = incomings
                .iter()
                .find(|incoming| incoming.pred == pred)
                .unwrap_or_else(|| {
                    panic!("phi in bb{} has no incoming for bb{}", block_id.0, pred.0)
                });
            if let Some(result) = &inst.result {
                phi_writes.push((result.id, get(&regs, incoming.value)));
            }
        }
        for (id, value) in phi_writes {
            regs.insert(id, value);
        }

        for inst in &block.insts[phi_count..] {
            fuel = fuel.checked_sub(1).ok_or(EvalError::OutOfFuel)?;
            eval_inst(inst, &mut regs, &mut memory, &mut calls)?;
        }

        fuel = fuel.checked_sub(1).ok_or(EvalError::OutOfFuel)?;
        let next = match &block.term {
            Terminator::Br { target } => *target,
            Terminator::CondBr {
                cond,
                then_bb,
                else_bb,
            } => {
                if get(&regs, *cond).as_bool() {
                    *then_bb
                } else {
                    *else_bb
                }
            }
            Terminator::IndirectBr { index, targets } => {
                let selector = get(&regs, *index).as_int();
                let slot = usize::try_from(selector)
                    .ok()
                    .filter(|slot| *slot < targets.len())
                    .ok_or(EvalError::BadIndirectTarget(selector))?;
                targets[slot]
            }
            Terminator::Return { value } => {
                let ret = value.map(|value| get(&regs, value));
                return Ok(Outcome { ret, calls });
            }
            Terminator::Unreachable => return Err(EvalError::ReachedUnreachable),
        };
        prev = Some(block_id);
        block_id = next;
    }
}

fn eval_inst(
    inst: &Instruction,
    regs: &mut HashMap<ValueId, Value>,
    memory: &mut [Value],
    calls: &mut Vec<CallEvent>,
) -> Result<(), EvalError> {
    let value = match &inst.kind {
        InstKind::Const { value } => match value {
            ConstValue::Unit => Value::Unit,
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::Int(v) => Value::Int(*v),
        },
        InstKind::BinOp { op, lhs, rhs } => {
            let lhs = get(regs, *lhs).as_int();
            let rhs = get(regs, *rhs).as_int();
            Value::Int(eval_binop(*op, lhs, rhs)?)
        }
        InstKind::UnOp { op, value } => {
            let operand = get(regs, *value);
            match op {
                UnOp::Neg => Value::Int(operand.as_int().wrapping_neg()),
                UnOp::Not => Value::Bool(!operand.as_bool()),
                UnOp::BitNot => Value::Int(!operand.as_int()),
            }
        }
        InstKind::Cmp { op, lhs, rhs } => {
            let lhs = get(regs, *lhs);
            let rhs = get(regs, *rhs);
            let result = match op {
                CmpOp::Eq => lhs == rhs,
                CmpOp::Ne => lhs != rhs,
                CmpOp::Lt => lhs.as_int() < rhs.as_int(),
                CmpOp::Le => lhs.as_int() <= rhs.as_int(),
                CmpOp::Gt => lhs.as_int() > rhs.as_int(),
                CmpOp::Ge => lhs.as_int() >= rhs.as_int(),
            };
            Value::Bool(result)
        }
        InstKind::Select {
            cond,
            then_value,
            else_value,
        } => {
            if get(regs, *cond).as_bool() {
                get(regs, *then_value)
            } else {
                get(regs, *else_value)
            }
        }
        InstKind::Phi { .. } => {
            panic!("phi below non-phi instruction; verify the function first")
        }
        InstKind::AddrOfLocal { local } => Value::Ptr(*local),
        InstKind::Load { ptr } => {
            let local = get(regs, *ptr).as_ptr();
            memory[local.index()]
        }
        InstKind::Store { ptr, value } => {
            let local = get(regs, *ptr).as_ptr();
            memory[local.index()] = get(regs, *value);
            return Ok(());
        }
        InstKind::Call { callee, args } => {
            let args: Vec<Value> = args.iter().map(|arg| get(regs, *arg)).collect();
            calls.push(CallEvent {
                callee: callee.clone(),
                args,
            });
            let ty = inst.result.map(|result| result.ty).unwrap_or(Type::Unit);
            Value::zero_of(ty)
        }
    };
    if let Some(result) = &inst.result {
        regs.insert(result.id, value);
    }
    Ok(())
}

fn eval_binop(op: BinOp, lhs: i64, rhs: i64) -> Result<i64, EvalError> {
    let value = match op {
        BinOp::Add => lhs.wrapping_add(rhs),
        BinOp::Sub => lhs.wrapping_sub(rhs),
        BinOp::Mul => lhs.wrapping_mul(rhs),
        BinOp::Div => {
            if rhs == 0 {
                return Err(EvalError::DivideByZero);
            }
            lhs.wrapping_div(rhs)
        }
        BinOp::Mod => {
            if rhs == 0 {
                return Err(EvalError::DivideByZero);
            }
            lhs.wrapping_rem(rhs)
        }
        BinOp::And => lhs & rhs,
        BinOp::Or => lhs | rhs,
        BinOp::Xor => lhs ^ rhs,
        BinOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinOp::Shr => lhs.wrapping_shr(rhs as u32),
    };
    Ok(value)
}

fn get(regs: &HashMap<ValueId, Value>, value: ValueId) -> Value {
    regs.get(&value)
        .copied()
        .unwrap_or_else(|| panic!("read of value %v{} before definition", value.0))
}

#[cfg(test)]
#[path = "tests/t_interp.rs"]
mod tests;

//! Text formatter for the IR.
//!
//! Produces a deterministic rendering used by dumps and by expected-text
//! tests. Output only; there is no parser for this syntax.

use std::fmt::Write as _;

use super::model::*;

pub fn format_func(func: &Function) -> String {
    let mut formatter = Formatter::new();
    formatter.write_function(func);
    formatter.finish()
}

struct Formatter {
    out: String,
}

impl Formatter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn finish(self) -> String {
        self.out
    }

    fn write_function(&mut self, func: &Function) {
        let _ = write!(&mut self.out, "fn {}(", func.name);
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                let _ = write!(&mut self.out, ", ");
            }
            let _ = write!(&mut self.out, "%v{}: {}", param.id.0, param.ty);
        }
        let _ = writeln!(&mut self.out, ") -> {} {{", func.sig.ret);

        if !func.locals.is_empty() {
            let _ = writeln!(&mut self.out, "  locals:");
            for local in &func.locals {
                let _ = write!(&mut self.out, "    %l{}: {}", local.id.0, local.ty);
                if let Some(name) = &local.name {
                    let _ = write!(&mut self.out, " ({})", name);
                }
                let _ = writeln!(&mut self.out);
            }
        }

        for (i, block) in func.blocks.iter().enumerate() {
            if i > 0 || !func.locals.is_empty() {
                let _ = writeln!(&mut self.out);
            }
            self.write_block(block);
        }

        let _ = writeln!(&mut self.out, "}}");
    }

    fn write_block(&mut self, block: &Block) {
        let _ = writeln!(&mut self.out, "  bb{}:", block.id.0);
        for inst in &block.insts {
            self.write_inst(inst);
        }
        self.write_terminator(&block.term);
    }

    fn write_inst(&mut self, inst: &Instruction) {
        let _ = write!(&mut self.out, "    ");
        if let Some(result) = &inst.result {
            let _ = write!(&mut self.out, "%v{}: {} = ", result.id.0, result.ty);
        }
        match &inst.kind {
            InstKind::Const { value } => match value {
                ConstValue::Unit => {
                    let _ = write!(&mut self.out, "const ()");
                }
                ConstValue::Bool(b) => {
                    let _ = write!(&mut self.out, "const {}", b);
                }
                ConstValue::Int(v) => {
                    let ty = inst.result.map(|r| r.ty).unwrap_or(Type::I64);
                    let _ = write!(&mut self.out, "const {}:{}", v, ty);
                }
            },
            InstKind::BinOp { op, lhs, rhs } => {
                let _ = write!(&mut self.out, "{} %v{}, %v{}", op.mnemonic(), lhs.0, rhs.0);
            }
            InstKind::UnOp { op, value } => {
                let _ = write!(&mut self.out, "{} %v{}", op.mnemonic(), value.0);
            }
            InstKind::Cmp { op, lhs, rhs } => {
                let _ = write!(&mut self.out, "{} %v{}, %v{}", op.mnemonic(), lhs.0, rhs.0);
            }
            InstKind::Select {
                cond,
                then_value,
                else_value,
            } => {
                let _ = write!(
                    &mut self.out,
                    "select %v{}, %v{}, %v{}",
                    cond.0, then_value.0, else_value.0
                );
            }
            InstKind::Phi { incomings } => {
                let _ = write!(&mut self.out, "phi [");
                for (i, incoming) in incomings.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(&mut self.out, ", ");
                    }
                    let _ = write!(&mut self.out, "bb{}: %v{}", incoming.pred.0, incoming.value.0);
                }
                let _ = write!(&mut self.out, "]");
            }
            InstKind::AddrOfLocal { local } => {
                let _ = write!(&mut self.out, "addr %l{}", local.0);
            }
            InstKind::Load { ptr } => {
                let _ = write!(&mut self.out, "load %v{}", ptr.0);
            }
            InstKind::Store { ptr, value } => {
                let _ = write!(&mut self.out, "store %v{}, %v{}", ptr.0, value.0);
            }
            InstKind::Call { callee, args } => {
                let _ = write!(&mut self.out, "call @{}(", callee);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(&mut self.out, ", ");
                    }
                    let _ = write!(&mut self.out, "%v{}", arg.0);
                }
                let _ = write!(&mut self.out, ")");
            }
        }
        let _ = writeln!(&mut self.out);
    }

    fn write_terminator(&mut self, term: &Terminator) {
        let _ = write!(&mut self.out, "    ");
        match term {
            Terminator::Br { target } => {
                let _ = write!(&mut self.out, "br bb{}", target.0);
            }
            Terminator::CondBr {
                cond,
                then_bb,
                else_bb,
            } => {
                let _ = write!(
                    &mut self.out,
                    "cbr %v{}, bb{}, bb{}",
                    cond.0, then_bb.0, else_bb.0
                );
            }
            Terminator::IndirectBr { index, targets } => {
                let _ = write!(&mut self.out, "ibr %v{}, [", index.0);
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(&mut self.out, ", ");
                    }
                    let _ = write!(&mut self.out, "bb{}", target.0);
                }
                let _ = write!(&mut self.out, "]");
            }
            Terminator::Return { value } => {
                let _ = write!(&mut self.out, "ret");
                if let Some(value) = value {
                    let _ = write!(&mut self.out, " %v{}", value.0);
                }
            }
            Terminator::Unreachable => {
                let _ = write!(&mut self.out, "unreachable");
            }
        }
        let _ = writeln!(&mut self.out);
    }
}

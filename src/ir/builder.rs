//! Minimal function builder.
//!
//! Provides a small API for constructing functions without exposing the raw
//! id allocation details. Fixtures and the demo driver build IR through this;
//! there is no textual front end.

use super::model::*;

/// Constructs functions while managing id allocation.
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, sig: FunctionSig) -> Self {
        Self {
            func: Function::new(name, sig),
        }
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.func.params[index].id
    }

    pub fn add_block(&mut self) -> BlockId {
        self.func.new_block()
    }

    pub fn add_local(&mut self, ty: Type, name: Option<&str>) -> LocalId {
        self.func.add_local(ty, name.map(str::to_string))
    }

    pub fn const_int(&mut self, block: BlockId, value: i64, ty: Type) -> ValueId {
        self.push(
            block,
            ty,
            InstKind::Const {
                value: ConstValue::Int(value),
            },
        )
    }

    pub fn const_bool(&mut self, block: BlockId, value: bool) -> ValueId {
        self.push(
            block,
            Type::Bool,
            InstKind::Const {
                value: ConstValue::Bool(value),
            },
        )
    }

    pub fn binop(
        &mut self,
        block: BlockId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: Type,
    ) -> ValueId {
        self.push(block, ty, InstKind::BinOp { op, lhs, rhs })
    }

    pub fn unop(&mut self, block: BlockId, op: UnOp, value: ValueId, ty: Type) -> ValueId {
        self.push(block, ty, InstKind::UnOp { op, value })
    }

    pub fn cmp(&mut self, block: BlockId, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(block, Type::Bool, InstKind::Cmp { op, lhs, rhs })
    }

    pub fn select(
        &mut self,
        block: BlockId,
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
        ty: Type,
    ) -> ValueId {
        self.push(
            block,
            ty,
            InstKind::Select {
                cond,
                then_value,
                else_value,
            },
        )
    }

    /// Adds a phi. Inserted after any phis already present so the phi prefix
    /// of the block stays contiguous regardless of call order.
    pub fn phi(&mut self, block: BlockId, ty: Type, incomings: &[(BlockId, ValueId)]) -> ValueId {
        let def = self.func.new_value(ty);
        let incomings = incomings
            .iter()
            .map(|&(pred, value)| PhiIncoming { pred, value })
            .collect();
        let block = self.func.block_mut(block);
        let at = block.insts.iter().take_while(|inst| inst.is_phi()).count();
        block.insts.insert(
            at,
            Instruction {
                result: Some(def),
                kind: InstKind::Phi { incomings },
            },
        );
        def.id
    }

    /// Appends an incoming to a phi created earlier. Back-edge values are
    /// only known once the latch is built, so phis are created with their
    /// entry incomings and patched here.
    pub fn add_phi_incoming(&mut self, block: BlockId, phi: ValueId, pred: BlockId, value: ValueId) {
        let block = self.func.block_mut(block);
        for inst in block.insts.iter_mut() {
            if inst.result.map(|result| result.id) != Some(phi) {
                continue;
            }
            if let InstKind::Phi { incomings } = &mut inst.kind {
                incomings.push(PhiIncoming { pred, value });
                return;
            }
        }
        panic!("no phi %v{} in bb{}", phi.0, block.id.0);
    }

    pub fn addr_of_local(&mut self, block: BlockId, local: LocalId) -> ValueId {
        self.push(block, Type::Ptr, InstKind::AddrOfLocal { local })
    }

    pub fn load(&mut self, block: BlockId, ptr: ValueId, ty: Type) -> ValueId {
        self.push(block, ty, InstKind::Load { ptr })
    }

    pub fn store(&mut self, block: BlockId, ptr: ValueId, value: ValueId) {
        let block = self.func.block_mut(block);
        block.insts.push(Instruction {
            result: None,
            kind: InstKind::Store { ptr, value },
        });
    }

    pub fn call(&mut self, block: BlockId, callee: &str, args: &[ValueId], ty: Type) -> ValueId {
        self.push(
            block,
            ty,
            InstKind::Call {
                callee: callee.to_string(),
                args: args.to_vec(),
            },
        )
    }

    pub fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        let block = self.func.block_mut(block);
        block.term = term;
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn push(&mut self, block: BlockId, ty: Type, kind: InstKind) -> ValueId {
        let def = self.func.new_value(ty);
        let block = self.func.block_mut(block);
        block.insts.push(Instruction {
            result: Some(def),
            kind,
        });
        def.id
    }
}

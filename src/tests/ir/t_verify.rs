use super::counting_loop;
use crate::ir::model::*;
use crate::ir::{verify_func, FunctionBuilder};

fn simple_diamond() -> Function {
    let mut b = FunctionBuilder::new(
        "diamond",
        FunctionSig {
            params: vec![Type::Bool],
            ret: Type::I64,
        },
    );
    let flag = b.param(0);
    let entry = b.add_block();
    let then_bb = b.add_block();
    let else_bb = b.add_block();
    let join = b.add_block();

    b.set_terminator(
        entry,
        Terminator::CondBr {
            cond: flag,
            then_bb,
            else_bb,
        },
    );
    let one = b.const_int(then_bb, 1, Type::I64); // %v1
    b.set_terminator(then_bb, Terminator::Br { target: join });
    let two = b.const_int(else_bb, 2, Type::I64); // %v2
    b.set_terminator(else_bb, Terminator::Br { target: join });
    let merged = b.phi(join, Type::I64, &[(then_bb, one), (else_bb, two)]); // %v3
    b.set_terminator(join, Terminator::Return { value: Some(merged) });
    b.finish()
}

#[test]
fn test_well_formed_functions_verify() {
    verify_func(&simple_diamond()).expect("diamond verifies");
    verify_func(&counting_loop()).expect("loop verifies");
}

#[test]
fn test_declaration_verifies_trivially() {
    let func = Function::new(
        "decl",
        FunctionSig {
            params: vec![Type::I64],
            ret: Type::I64,
        },
    );
    verify_func(&func).expect("no body, nothing to reject");
}

#[test]
fn test_duplicate_definition_is_rejected() {
    let mut func = simple_diamond();
    // Forge a second definition of %v1.
    func.blocks[2].insts.push(Instruction {
        result: Some(ValueDef {
            id: ValueId(1),
            ty: Type::I64,
        }),
        kind: InstKind::Const {
            value: ConstValue::Int(3),
        },
    });
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("duplicate definition of %v1"));
}

#[test]
fn test_undefined_use_is_rejected() {
    let mut func = simple_diamond();
    func.blocks[3].term = Terminator::Return {
        value: Some(ValueId(99)),
    };
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("use of undefined value %v99"));
}

#[test]
fn test_use_before_definition_in_block_is_rejected() {
    let mut b = FunctionBuilder::new(
        "backwards",
        FunctionSig {
            params: vec![],
            ret: Type::I64,
        },
    );
    let entry = b.add_block();
    let one = b.const_int(entry, 1, Type::I64); // %v0
    let doubled = b.binop(entry, BinOp::Add, one, one, Type::I64); // %v1
    b.set_terminator(entry, Terminator::Return { value: Some(doubled) });
    let mut func = b.finish();

    func.blocks[0].insts.swap(0, 1);
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("does not dominate"));
}

#[test]
fn test_sibling_branch_values_do_not_dominate() {
    let mut func = simple_diamond();
    // Make the else-arm constant read the then-arm constant.
    func.blocks[2].insts[0] = Instruction {
        result: Some(ValueDef {
            id: ValueId(2),
            ty: Type::I64,
        }),
        kind: InstKind::UnOp {
            op: UnOp::Neg,
            value: ValueId(1),
        },
    };
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("does not dominate"));
}

#[test]
fn test_branch_to_entry_block_is_rejected() {
    let mut func = simple_diamond();
    func.blocks[1].term = Terminator::Br {
        target: BlockId(0),
    };
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("branches to the entry block"));
}

#[test]
fn test_branch_to_undeclared_block_is_rejected() {
    let mut func = simple_diamond();
    func.blocks[1].term = Terminator::Br {
        target: BlockId(9),
    };
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("branches to undeclared bb9"));
}

#[test]
fn test_phi_incomings_must_match_predecessors() {
    let mut func = simple_diamond();
    let Instruction {
        kind: InstKind::Phi { incomings },
        ..
    } = &mut func.blocks[3].insts[0]
    else {
        panic!("join lost its phi");
    };
    incomings.pop();
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("0 incomings for predecessor"));
}

#[test]
fn test_phi_naming_a_non_predecessor_is_rejected() {
    let mut func = simple_diamond();
    let Instruction {
        kind: InstKind::Phi { incomings },
        ..
    } = &mut func.blocks[3].insts[0]
    else {
        panic!("join lost its phi");
    };
    incomings[0].pred = BlockId(0);
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("not a predecessor"));
}

#[test]
fn test_phi_below_non_phi_is_rejected() {
    let mut func = simple_diamond();
    let phi = func.blocks[3].insts.remove(0);
    func.blocks[3].insts.push(Instruction {
        result: Some(ValueDef {
            id: ValueId(4),
            ty: Type::I64,
        }),
        kind: InstKind::Const {
            value: ConstValue::Int(0),
        },
    });
    func.blocks[3].insts.push(phi);
    let error = verify_func(&func).unwrap_err();
    assert!(error.to_string().contains("phi below non-phi"));
}

use indoc::indoc;

use super::{
    assert_ir_eq, assert_same_outcomes, def_block, indirect_entry_loop, invariant_phi_loop,
    nested_loop, sum_loop,
};
use crate::interp::Value;
use crate::ir::model::*;
use crate::ir::{format_func, verify_func, FunctionBuilder};
use crate::opt::licm::Licm;
use crate::opt::{Pass, PassResult};

#[test]
fn test_hoists_invariant_add_out_of_loop() {
    let mut func = sum_loop();
    let result = Licm.run(&mut func);
    assert_eq!(result, PassResult::Invalidated);
    verify_func(&func).expect("hoisted function must stay well-formed");

    let expected = indoc! {"
        fn sum(%v0: i64, %v1: i64, %v2: i64) -> i64 {
          bb0:
            %v3: i64 = const 0:i64
            %v7: i64 = add %v1, %v2
            %v9: i64 = const 1:i64
            br bb1

          bb1:
            %v4: i64 = phi [bb0: %v3, bb2: %v10]
            %v5: i64 = phi [bb0: %v3, bb2: %v8]
            %v6: bool = lt %v4, %v0
            cbr %v6, bb2, bb3

          bb2:
            %v8: i64 = add %v5, %v7
            %v10: i64 = add %v4, %v9
            br bb1

          bb3:
            ret %v5
        }
    "};
    assert_ir_eq(format_func(&func), expected);
}

#[test]
fn test_preserves_outcomes_for_any_trip_count() {
    let before = sum_loop();
    let mut after = before.clone();
    Licm.run(&mut after);

    let grids: Vec<Vec<Value>> = [0, 1, 2, 7]
        .iter()
        .map(|&n| vec![Value::Int(n), Value::Int(3), Value::Int(5)])
        .collect();
    assert_same_outcomes(&before, &after, &grids);
}

#[test]
fn test_second_run_moves_nothing_further() {
    let mut func = sum_loop();
    Licm.run(&mut func);
    let once = format_func(&func);

    let result = Licm.run(&mut func);
    // The traversal ran again, so the conservative report stands...
    assert_eq!(result, PassResult::Invalidated);
    // ...but the IR has reached its fixed point.
    assert_eq!(format_func(&func), once);
}

#[test]
fn test_inner_invariant_stops_at_inner_preheader() {
    let mut func = nested_loop();
    let row = ValueId(10); // i * n
    assert_eq!(def_block(&func, row), Some(BlockId(4)));

    Licm.run(&mut func);
    verify_func(&func).expect("hoisted function must stay well-formed");

    // Hoisted out of the inner body into the inner preheader, and no
    // further: `i` varies in the outer loop.
    assert_eq!(def_block(&func, row), Some(BlockId(2)));
}

#[test]
fn test_nested_loop_outcomes_survive() {
    let before = nested_loop();
    let mut after = before.clone();
    Licm.run(&mut after);

    let mut grids = Vec::new();
    for n in [0, 1, 3] {
        for m in [0, 1, 4] {
            grids.push(vec![Value::Int(n), Value::Int(m)]);
        }
    }
    assert_same_outcomes(&before, &after, &grids);
}

#[test]
fn test_oracle_invariant_phi_is_never_moved() {
    let mut func = invariant_phi_loop();
    Licm.run(&mut func);
    verify_func(&func).expect("function must stay well-formed");

    // The steady phi stays in the header, and no phi ends up in a block
    // outside the loop.
    assert_eq!(def_block(&func, ValueId(4)), Some(BlockId(1)));
    for block in &func.blocks {
        if block.id != BlockId(1) {
            assert!(
                block.insts.iter().all(|inst| !inst.is_phi()),
                "phi leaked into bb{}",
                block.id.0
            );
        }
    }
}

#[test]
fn test_loop_behind_indirect_branch_is_left_alone() {
    let mut func = indirect_entry_loop();
    let before = format_func(&func);

    let result = Licm.run(&mut func);
    // The loop was seen, so analyses are conservatively invalidated...
    assert_eq!(result, PassResult::Invalidated);
    // ...yet the function is untouched: the only loop cannot be simplified.
    assert_eq!(format_func(&func), before);
}

#[test]
fn test_dependent_candidates_keep_their_order() {
    // c = a + b; d = c * c: both invariant, and d depends on c.
    let mut b = FunctionBuilder::new(
        "chain",
        FunctionSig {
            params: vec![Type::I64, Type::I64, Type::I64],
            ret: Type::I64,
        },
    );
    let (n, x, y) = (b.param(0), b.param(1), b.param(2));
    let entry = b.add_block();
    let header = b.add_block();
    let body = b.add_block();
    let exit = b.add_block();

    let zero = b.const_int(entry, 0, Type::I64); // %v3
    let one = b.const_int(entry, 1, Type::I64); // %v4
    b.set_terminator(entry, Terminator::Br { target: header });

    let i = b.phi(header, Type::I64, &[(entry, zero)]); // %v5
    let acc = b.phi(header, Type::I64, &[(entry, zero)]); // %v6
    let cond = b.cmp(header, CmpOp::Lt, i, n); // %v7
    b.set_terminator(
        header,
        Terminator::CondBr {
            cond,
            then_bb: body,
            else_bb: exit,
        },
    );

    let c = b.binop(body, BinOp::Add, x, y, Type::I64); // %v8
    let d = b.binop(body, BinOp::Mul, c, c, Type::I64); // %v9
    let acc_next = b.binop(body, BinOp::Add, acc, d, Type::I64); // %v10
    let i_next = b.binop(body, BinOp::Add, i, one, Type::I64); // %v11
    b.set_terminator(body, Terminator::Br { target: header });
    b.add_phi_incoming(header, i, body, i_next);
    b.add_phi_incoming(header, acc, body, acc_next);

    b.set_terminator(exit, Terminator::Return { value: Some(acc) });
    let mut func = b.finish();

    Licm.run(&mut func);
    verify_func(&func).expect("producer must land ahead of its consumer");

    let preheader = func.block(BlockId(0));
    let position = |value: ValueId| {
        preheader
            .insts
            .iter()
            .position(|inst| inst.result.map(|r| r.id) == Some(value))
    };
    let c_at = position(c).expect("c hoisted");
    let d_at = position(d).expect("d hoisted");
    assert!(c_at < d_at);
}

#[test]
fn test_no_loops_means_analyses_preserved() {
    let mut b = FunctionBuilder::new(
        "straight",
        FunctionSig {
            params: vec![Type::I64, Type::I64],
            ret: Type::I64,
        },
    );
    let (x, y) = (b.param(0), b.param(1));
    let entry = b.add_block();
    let sum = b.binop(entry, BinOp::Add, x, y, Type::I64);
    b.set_terminator(entry, Terminator::Return { value: Some(sum) });
    let mut func = b.finish();

    let before = format_func(&func);
    assert_eq!(Licm.run(&mut func), PassResult::Preserved);
    assert_eq!(format_func(&func), before);
}

#[test]
fn test_declaration_without_body_is_a_no_op() {
    let mut func = Function::new(
        "extern_decl",
        FunctionSig {
            params: vec![Type::I64],
            ret: Type::I64,
        },
    );
    assert_eq!(Licm.run(&mut func), PassResult::Preserved);
    assert!(func.blocks.is_empty());
}

#[test]
fn test_header_only_loop_hoists_nothing() {
    // Degenerate loop: the header is its own latch and body.
    let mut b = FunctionBuilder::new(
        "tight",
        FunctionSig {
            params: vec![Type::I64],
            ret: Type::I64,
        },
    );
    let n = b.param(0);
    let entry = b.add_block();
    let header = b.add_block();
    let exit = b.add_block();

    let zero = b.const_int(entry, 0, Type::I64); // %v1
    let one = b.const_int(entry, 1, Type::I64); // %v2
    b.set_terminator(entry, Terminator::Br { target: header });

    let i = b.phi(header, Type::I64, &[(entry, zero)]); // %v3
    let i_next = b.binop(header, BinOp::Add, i, one, Type::I64); // %v4
    let cond = b.cmp(header, CmpOp::Lt, i_next, n); // %v5
    b.set_terminator(
        header,
        Terminator::CondBr {
            cond,
            then_bb: header,
            else_bb: exit,
        },
    );
    b.add_phi_incoming(header, i, header, i_next);

    b.set_terminator(exit, Terminator::Return { value: Some(i_next) });
    let mut func = b.finish();

    let before = func.clone();
    assert_eq!(Licm.run(&mut func), PassResult::Invalidated);
    verify_func(&func).expect("function must stay well-formed");
    assert_same_outcomes(&before, &func, &super::int_grid(&[0, 1, 5]));
}

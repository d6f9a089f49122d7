use indoc::indoc;

use super::{assert_ir_eq, counting_loop};
use crate::ir::format_func;
use crate::ir::model::*;
use crate::ir::FunctionBuilder;

#[test]
fn test_format_covers_instruction_kinds() {
    let mut b = FunctionBuilder::new(
        "kitchen",
        FunctionSig {
            params: vec![Type::I64, Type::Bool],
            ret: Type::I64,
        },
    );
    let (n, flag) = (b.param(0), b.param(1));
    let tmp = b.add_local(Type::I64, Some("tmp"));
    let entry = b.add_block();
    let left = b.add_block();
    let right = b.add_block();
    let join = b.add_block();

    let addr = b.addr_of_local(entry, tmp); // %v2
    let nine = b.const_int(entry, 9, Type::I64); // %v3
    b.store(entry, addr, nine);
    let loaded = b.load(entry, addr, Type::I64); // %v4
    let negated = b.unop(entry, UnOp::Neg, loaded, Type::I64); // %v5
    let truth = b.const_bool(entry, true); // %v6
    let picked = b.select(entry, truth, loaded, negated, Type::I64); // %v7
    let clamped = b.call(entry, "clamp", &[picked, n], Type::I64); // %v8
    b.cmp(entry, CmpOp::Ge, clamped, n); // %v9
    b.set_terminator(
        entry,
        Terminator::CondBr {
            cond: flag,
            then_bb: left,
            else_bb: right,
        },
    );
    b.set_terminator(left, Terminator::Br { target: join });
    b.set_terminator(right, Terminator::Br { target: join });
    let merged = b.phi(join, Type::I64, &[(left, clamped), (right, nine)]); // %v10
    b.set_terminator(join, Terminator::Return { value: Some(merged) });
    let func = b.finish();

    let expected = indoc! {"
        fn kitchen(%v0: i64, %v1: bool) -> i64 {
          locals:
            %l0: i64 (tmp)

          bb0:
            %v2: ptr = addr %l0
            %v3: i64 = const 9:i64
            store %v2, %v3
            %v4: i64 = load %v2
            %v5: i64 = neg %v4
            %v6: bool = const true
            %v7: i64 = select %v6, %v4, %v5
            %v8: i64 = call @clamp(%v7, %v0)
            %v9: bool = ge %v8, %v0
            cbr %v1, bb1, bb2

          bb1:
            br bb3

          bb2:
            br bb3

          bb3:
            %v10: i64 = phi [bb1: %v8, bb2: %v3]
            ret %v10
        }
    "};
    assert_ir_eq(format_func(&func), expected);
}

#[test]
fn test_format_loop_with_phi() {
    let func = counting_loop();
    let expected = indoc! {"
        fn counting(%v0: i64) -> i64 {
          bb0:
            %v1: i64 = const 0:i64
            %v2: i64 = const 1:i64
            br bb1

          bb1:
            %v3: i64 = phi [bb0: %v1, bb2: %v5]
            %v4: bool = lt %v3, %v0
            cbr %v4, bb2, bb3

          bb2:
            %v5: i64 = add %v3, %v2
            br bb1

          bb3:
            ret %v3
        }
    "};
    assert_ir_eq(format_func(&func), expected);
}

#[test]
fn test_format_indirect_branch_and_unreachable() {
    let mut b = FunctionBuilder::new(
        "hop",
        FunctionSig {
            params: vec![Type::I64],
            ret: Type::Unit,
        },
    );
    let sel = b.param(0);
    let entry = b.add_block();
    let stop = b.add_block();
    let dead = b.add_block();

    b.set_terminator(
        entry,
        Terminator::IndirectBr {
            index: sel,
            targets: vec![stop, dead],
        },
    );
    b.set_terminator(stop, Terminator::Return { value: None });
    let func = b.finish();

    let expected = indoc! {"
        fn hop(%v0: i64) -> () {
          bb0:
            ibr %v0, [bb1, bb2]

          bb1:
            ret

          bb2:
            unreachable
        }
    "};
    assert_ir_eq(format_func(&func), expected);
}

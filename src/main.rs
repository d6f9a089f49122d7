use clap::Parser as ClapParser;
use env_logger::Env;

use hoist::analysis::cfg::Cfg;
use hoist::analysis::dom::DomTree;
use hoist::analysis::loops::LoopForest;
use hoist::interp::{self, Value};
use hoist::ir::{
    format_func, verify_func, BinOp, CmpOp, Function, FunctionBuilder, FunctionSig, Terminator,
    Type,
};
use hoist::opt::PassManager;

#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated pass pipeline, e.g. promote-locals,licm
    /// (defaults to the standard pipeline)
    #[clap(long)]
    passes: Option<String>,

    /// Comma-separated list of things to dump: ir,loops
    #[clap(long)]
    dump: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut dump_ir = false;
    let mut dump_loops = false;
    if let Some(dump) = &args.dump {
        for item in dump.split(',').map(|s| s.trim().to_lowercase()) {
            match item.as_str() {
                "ir" => dump_ir = true,
                "loops" => dump_loops = true,
                "" => {}
                _ => eprintln!("[WARN] unknown dump flag: {item}"),
            }
        }
    }

    let mut manager = match &args.passes {
        Some(desc) => match PassManager::parse(desc) {
            Ok(manager) => manager,
            Err(error) => {
                eprintln!("[ERROR] {error}");
                std::process::exit(2);
            }
        },
        None => PassManager::standard(),
    };

    let demos: Vec<(Function, Vec<Value>)> = vec![
        (demo_sum(), vec![Value::Int(6), Value::Int(3), Value::Int(5)]),
        (demo_nest(), vec![Value::Int(4), Value::Int(3)]),
    ];
    let inputs: Vec<Vec<Value>> = demos.iter().map(|(_, args)| args.clone()).collect();
    let mut funcs: Vec<Function> = demos.into_iter().map(|(func, _)| func).collect();

    let before: Vec<_> = funcs
        .iter()
        .zip(&inputs)
        .map(|(func, args)| interp::run(func, args))
        .collect();

    if dump_ir {
        for func in &funcs {
            println!("IR before ({}):", func.name);
            println!("--------------------------------");
            print!("{}", format_func(func));
            println!("--------------------------------");
        }
    }

    manager.run(&mut funcs);

    for func in &funcs {
        if let Err(error) = verify_func(func) {
            eprintln!("[ERROR] verification failed: {error}");
            std::process::exit(1);
        }
    }

    if dump_ir {
        for func in &funcs {
            println!("IR after ({}):", func.name);
            println!("--------------------------------");
            print!("{}", format_func(func));
            println!("--------------------------------");
        }
    }

    if dump_loops {
        for func in &funcs {
            let cfg = Cfg::new(func);
            let dom = DomTree::new(&cfg);
            let forest = LoopForest::new(&cfg, &dom);
            println!("Loops ({}):", func.name);
            println!("--------------------------------");
            for (_, lp) in forest.iter() {
                let preheader = lp
                    .preheader(&cfg, func)
                    .map(|block| format!("bb{}", block.0))
                    .unwrap_or_else(|| "none".to_string());
                let blocks: Vec<String> =
                    lp.blocks.iter().map(|block| format!("bb{}", block.0)).collect();
                println!(
                    "header bb{}, preheader {}, blocks [{}]",
                    lp.header.0,
                    preheader,
                    blocks.join(", ")
                );
            }
            println!("--------------------------------");
        }
    }

    for ((func, args), before) in funcs.iter().zip(&inputs).zip(before) {
        let after = interp::run(func, args);
        match (&before, &after) {
            (Ok(b), Ok(a)) if b == a => {
                println!("[OK] {}: outcome unchanged, returns {:?}", func.name, a.ret);
            }
            _ => {
                eprintln!(
                    "[ERROR] {}: outcome changed: before {:?}, after {:?}",
                    func.name, before, after
                );
                std::process::exit(1);
            }
        }
    }
}

/// `for (i = 0; i < n; i++) acc += a * b; return acc;`. The product does
/// not depend on the loop and ends up in the preheader.
fn demo_sum() -> Function {
    let mut b = FunctionBuilder::new(
        "demo_sum",
        FunctionSig {
            params: vec![Type::I64, Type::I64, Type::I64],
            ret: Type::I64,
        },
    );
    let (n, x, y) = (b.param(0), b.param(1), b.param(2));
    let i = b.add_local(Type::I64, Some("i"));
    let acc = b.add_local(Type::I64, Some("acc"));

    let entry = b.add_block();
    let header = b.add_block();
    let body = b.add_block();
    let exit = b.add_block();

    let pi = b.addr_of_local(entry, i);
    let pacc = b.addr_of_local(entry, acc);
    let zero = b.const_int(entry, 0, Type::I64);
    b.store(entry, pi, zero);
    b.store(entry, pacc, zero);
    b.set_terminator(entry, Terminator::Br { target: header });

    let iv = b.load(header, pi, Type::I64);
    let cond = b.cmp(header, CmpOp::Lt, iv, n);
    b.set_terminator(
        header,
        Terminator::CondBr {
            cond,
            then_bb: body,
            else_bb: exit,
        },
    );

    let scaled = b.binop(body, BinOp::Mul, x, y, Type::I64);
    let accv = b.load(body, pacc, Type::I64);
    let sum = b.binop(body, BinOp::Add, accv, scaled, Type::I64);
    b.store(body, pacc, sum);
    let one = b.const_int(body, 1, Type::I64);
    let next = b.binop(body, BinOp::Add, iv, one, Type::I64);
    b.store(body, pi, next);
    b.set_terminator(body, Terminator::Br { target: header });

    let ret = b.load(exit, pacc, Type::I64);
    b.set_terminator(exit, Terminator::Return { value: Some(ret) });
    b.finish()
}

/// Doubly-nested loop where the inner body recomputes `i * n` — invariant
/// for the inner loop only, so it moves to the inner preheader.
fn demo_nest() -> Function {
    let mut b = FunctionBuilder::new(
        "demo_nest",
        FunctionSig {
            params: vec![Type::I64, Type::I64],
            ret: Type::I64,
        },
    );
    let (n, m) = (b.param(0), b.param(1));
    let i = b.add_local(Type::I64, Some("i"));
    let j = b.add_local(Type::I64, Some("j"));
    let acc = b.add_local(Type::I64, Some("acc"));

    let entry = b.add_block();
    let outer_header = b.add_block();
    let outer_body = b.add_block();
    let inner_header = b.add_block();
    let inner_body = b.add_block();
    let outer_latch = b.add_block();
    let exit = b.add_block();

    let pi = b.addr_of_local(entry, i);
    let pj = b.addr_of_local(entry, j);
    let pacc = b.addr_of_local(entry, acc);
    let zero = b.const_int(entry, 0, Type::I64);
    b.store(entry, pi, zero);
    b.store(entry, pacc, zero);
    b.set_terminator(entry, Terminator::Br { target: outer_header });

    let iv = b.load(outer_header, pi, Type::I64);
    let outer_cond = b.cmp(outer_header, CmpOp::Lt, iv, n);
    b.set_terminator(
        outer_header,
        Terminator::CondBr {
            cond: outer_cond,
            then_bb: outer_body,
            else_bb: exit,
        },
    );

    let zero_j = b.const_int(outer_body, 0, Type::I64);
    b.store(outer_body, pj, zero_j);
    b.set_terminator(outer_body, Terminator::Br { target: inner_header });

    let jv = b.load(inner_header, pj, Type::I64);
    let inner_cond = b.cmp(inner_header, CmpOp::Lt, jv, m);
    b.set_terminator(
        inner_header,
        Terminator::CondBr {
            cond: inner_cond,
            then_bb: inner_body,
            else_bb: outer_latch,
        },
    );

    let iv2 = b.load(inner_body, pi, Type::I64);
    let row = b.binop(inner_body, BinOp::Mul, iv2, n, Type::I64);
    let cell = b.binop(inner_body, BinOp::Add, row, jv, Type::I64);
    let accv = b.load(inner_body, pacc, Type::I64);
    let sum = b.binop(inner_body, BinOp::Add, accv, cell, Type::I64);
    b.store(inner_body, pacc, sum);
    let one = b.const_int(inner_body, 1, Type::I64);
    let jnext = b.binop(inner_body, BinOp::Add, jv, one, Type::I64);
    b.store(inner_body, pj, jnext);
    b.set_terminator(inner_body, Terminator::Br { target: inner_header });

    let one_i = b.const_int(outer_latch, 1, Type::I64);
    let iv3 = b.load(outer_latch, pi, Type::I64);
    let inext = b.binop(outer_latch, BinOp::Add, iv3, one_i, Type::I64);
    b.store(outer_latch, pi, inext);
    b.set_terminator(outer_latch, Terminator::Br { target: outer_header });

    let ret = b.load(exit, pacc, Type::I64);
    b.set_terminator(exit, Terminator::Return { value: Some(ret) });
    b.finish()
}

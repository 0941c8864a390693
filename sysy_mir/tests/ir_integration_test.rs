//! End-to-end tests exercising the public API together: building a module
//! with the `Builder`, verifying its invariants, round-tripping it through
//! the text format, and declaring the runtime library.

use smallvec::smallvec;
use sysy_mir::{
    parse_module, print_module, runtime, verify_module, Builder, CmpOp, Const, IntBinOp, Module,
    Operator,
};

#[test]
fn builds_and_verifies_a_max_function() {
    // fn @max(%a: i32, %b: i32) -> i32 { if a > b { ret a } else { ret b } }
    let mut m = Module::new("max");
    let i32_ty = m.tcx.i32;
    let f = m.add_function("max", &[i32_ty, i32_ty], i32_ty);
    let params = m.function_params(f).to_vec();
    let (a, b) = (params[0], params[1]);

    let entry = m.add_block(f, "entry");
    let then_blk = m.add_block(f, "then");
    let else_blk = m.add_block(f, "else");

    let mut bld = Builder::new(&mut m);
    bld.set_insert_point(entry);
    let cond = bld.icmp(CmpOp::Gt, a, b);
    bld.branch(cond, then_blk, else_blk);

    bld.set_insert_point(then_blk);
    bld.ret(Some(a));

    bld.set_insert_point(else_blk);
    bld.ret(Some(b));

    verify_module(&m).expect("well-formed function passes verification");

    let text = print_module(&m);
    assert!(text.contains("icmp.gt"));
    assert!(text.contains("br %"));
}

#[test]
fn round_trips_a_function_with_a_loop_phi() {
    let mut m = Module::new("loop");
    let i32_ty = m.tcx.i32;
    let f = m.add_function("sum_to_n", &[i32_ty], i32_ty);
    let n = m.function_params(f)[0];

    let entry = m.add_block(f, "entry");
    let header = m.add_block(f, "header");
    let body = m.add_block(f, "body");
    let exit = m.add_block(f, "exit");

    let mut bld = Builder::new(&mut m);
    bld.set_insert_point(entry);
    let zero = bld.module.make_const(Const::Int(0));
    bld.jump(header);

    bld.set_insert_point(header);
    let sum_phi = bld.phi(i32_ty);
    let i_phi = bld.phi(i32_ty);
    let cont = bld.icmp(CmpOp::Le, i_phi, n);
    bld.branch(cont, body, exit);

    bld.set_insert_point(body);
    let next_sum = bld.int_binary(IntBinOp::Add, sum_phi, i_phi);
    let one = bld.module.make_const(Const::Int(1));
    let next_i = bld.int_binary(IntBinOp::Add, i_phi, one);
    bld.jump(header);

    bld.add_incoming(sum_phi, entry, zero);
    bld.add_incoming(sum_phi, body, next_sum);
    bld.add_incoming(i_phi, entry, one);
    bld.add_incoming(i_phi, body, next_i);

    bld.set_insert_point(exit);
    bld.ret(Some(sum_phi));

    verify_module(&m).expect("loop with phi nodes passes verification");

    let text = print_module(&m);
    let parsed = parse_module(&text).expect("parses its own printed output");
    assert_eq!(text, print_module(&parsed));
    verify_module(&parsed).expect("round-tripped module is still well-formed");
}

#[test]
fn declares_runtime_library_and_tracks_usage() {
    let mut m = Module::new("io");
    runtime::declare_all(&mut m);
    assert_eq!(m.functions.len(), sysy_mir::RuntimeFn::ALL.len());
    assert_eq!(m.used_runtime_fns().count(), 0);

    let i32_ty = m.tcx.i32;
    let f = m.add_function("main", &[], i32_ty);
    let entry = m.add_block(f, "entry");
    let putint = m
        .functions
        .iter()
        .copied()
        .find(|&fid| m.name_of(fid) == "putint")
        .expect("putint was declared");

    let mut bld = Builder::new(&mut m);
    bld.set_insert_point(entry);
    let seven = bld.module.make_const(Const::Int(7));
    bld.call(putint, &[seven]);
    let zero = bld.module.make_const(Const::Int(0));
    bld.ret(Some(zero));

    assert_eq!(m.used_runtime_fns().collect::<Vec<_>>(), vec![sysy_mir::RuntimeFn::PutInt]);
}

#[test]
fn clearing_operands_of_a_dead_instruction_unhooks_it_from_the_graph() {
    let mut m = Module::new("m");
    let i32_ty = m.tcx.i32;
    let a = m.make_const(Const::Int(1));
    let b = m.make_const(Const::Int(2));
    let add = m.create_instr("unused", i32_ty, Operator::IntBinary(IntBinOp::Add), smallvec![a, b]);

    assert_eq!(m.users(a), &[add]);
    m.clear_operands(add);
    assert!(m.users(a).is_empty());
    assert!(m.users(b).is_empty());
}

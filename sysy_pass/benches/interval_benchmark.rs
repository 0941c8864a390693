use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sysy_mir::{Builder, Const, IntBinOp, Module, ValueId};
use sysy_pass::{pass::PassManager, Transform};

/// A single counting loop `for (i = 0; i < bound; i = i + 1) acc = acc + i;`
/// nested `depth` times — the shape interval analysis is least obviously
/// linear on, since every loop header forces a widen/re-worklist round
/// before the fixed point is reached.
fn build_nested_counting_loops(depth: usize) -> (Module, ValueId) {
    let mut m = Module::new("bench");
    let i32_ty = m.tcx.i32;
    let f = m.add_function("nested", &[i32_ty], i32_ty);
    let bound = m.function_params(f)[0];

    let entry = m.add_block(f, "entry");
    let mut header_blocks = Vec::new();
    let mut body_blocks = Vec::new();
    let mut exit_blocks = Vec::new();
    for i in 0..depth {
        header_blocks.push(m.add_block(f, &format!("loop{i}_header")));
        body_blocks.push(m.add_block(f, &format!("loop{i}_body")));
        exit_blocks.push(m.add_block(f, &format!("loop{i}_exit")));
    }
    let ret_block = m.add_block(f, "ret");

    let mut b = Builder::new(&mut m);
    b.set_insert_point(entry);
    b.jump(header_blocks[0]);

    for i in 0..depth {
        let header = header_blocks[i];
        let body = body_blocks[i];
        let exit = exit_blocks[i];
        let next = if i + 1 < depth { header_blocks[i + 1] } else { ret_block };

        let entry_edge = if i == 0 { entry } else { exit_blocks[i - 1] };
        b.set_insert_point(header);
        let iv = b.phi(i32_ty);
        let zero = b.module.make_const(Const::Int(0));
        b.add_incoming(iv, entry_edge, zero);
        let cond = b.icmp(sysy_mir::CmpOp::Lt, iv, bound);
        b.branch(cond, body, exit);

        b.set_insert_point(body);
        let one = b.module.make_const(Const::Int(1));
        let next_iv = b.int_binary(IntBinOp::Add, iv, one);
        b.add_incoming(iv, body, next_iv);
        b.jump(header);

        b.set_insert_point(exit);
        b.jump(next);
    }

    b.set_insert_point(ret_block);
    b.ret(Some(bound));

    (m, f)
}

fn benchmark_interval_fixed_point_on_nested_loops(c: &mut Criterion) {
    c.bench_function("interval_fixed_point_20_nested_loops", |bencher| {
        bencher.iter(|| {
            let (mut m, f) = build_nested_counting_loops(black_box(20));
            let mut pm = PassManager::new();
            let mut pass = sysy_pass::IntervalAnalysis;
            pass.run(&mut m, &mut pm).expect("interval analysis converges");
        });
    });
}

criterion_group!(benches, benchmark_interval_fixed_point_on_nested_loops);
criterion_main!(benches);

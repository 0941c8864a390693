use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sysy_mir::{Builder, Const, IntBinOp, Module, ValueId};
use sysy_pass::{cfg, dominance};

/// A function made of `depth` consecutive diamonds (`if (x > k) a else b`
/// merging back into the next diamond's entry) — the shape dominance's
/// preorder/frontier computation is least obviously linear on, since every
/// merge block's frontier membership has to walk back up the tree.
fn build_diamond_chain(depth: usize) -> (Module, ValueId) {
    let mut m = Module::new("bench");
    let i32_ty = m.tcx.i32;
    let f = m.add_function("chain", &[i32_ty], i32_ty);
    let param = m.function_params(f)[0];

    let mut prev_merge = m.add_block(f, "entry");
    let mut b = Builder::new(&mut m);
    b.set_insert_point(prev_merge);
    let zero = b.module.make_const(Const::Int(0));
    let cmp0 = b.icmp(sysy_mir::CmpOp::Gt, param, zero);
    drop(b);

    let mut cond = cmp0;
    for i in 0..depth {
        let then_blk = m.add_block(f, &format!("then{i}"));
        let else_blk = m.add_block(f, &format!("else{i}"));
        let merge_blk = m.add_block(f, &format!("merge{i}"));

        let mut b = Builder::new(&mut m);
        b.set_insert_point(prev_merge);
        b.branch(cond, then_blk, else_blk);

        b.set_insert_point(then_blk);
        b.jump(merge_blk);

        b.set_insert_point(else_blk);
        b.jump(merge_blk);

        b.set_insert_point(merge_blk);
        let k = b.module.make_const(Const::Int(i as i32));
        let next_cond = b.icmp(sysy_mir::CmpOp::Gt, param, k);

        prev_merge = merge_blk;
        cond = next_cond;
    }

    let mut b = Builder::new(&mut m);
    b.set_insert_point(prev_merge);
    let one = b.module.make_const(Const::Int(1));
    let result = b.int_binary(IntBinOp::Add, param, one);
    b.ret(Some(result));

    (m, f)
}

fn benchmark_dominance_on_diamond_chain(c: &mut Criterion) {
    let (m, f) = build_diamond_chain(200);
    c.bench_function("dominance_build_200_diamonds", |bencher| {
        bencher.iter(|| {
            let graph = cfg::build(&m, black_box(f));
            dominance::build(&m, f, &graph)
        });
    });
}

fn benchmark_dominance_frontier_lookup(c: &mut Criterion) {
    let (m, f) = build_diamond_chain(200);
    let graph = cfg::build(&m, f);
    let dom = dominance::build(&m, f, &graph);
    let blocks: Vec<ValueId> = m.function_blocks(f).to_vec();

    c.bench_function("dominance_frontier_lookup_all_blocks", |bencher| {
        bencher.iter(|| {
            for &block in &blocks {
                black_box(dom.frontier(block));
            }
        });
    });
}

criterion_group!(benches, benchmark_dominance_on_diamond_chain, benchmark_dominance_frontier_lookup);
criterion_main!(benches);

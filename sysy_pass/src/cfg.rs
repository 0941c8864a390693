//! Control-flow graph analysis: predecessor/successor sets derived from each
//! block's terminator. Re-running on a clean function is a no-op (the pass
//! manager's memoization in `pass.rs` is what actually skips the work).

use hashbrown::HashMap;
use sysy_mir::{Module, Operator, ValueId};

/// `pred`/`succ` sets for every block of one function, in block-list order.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    pub succ: HashMap<ValueId, Vec<ValueId>>,
    pub pred: HashMap<ValueId, Vec<ValueId>>,
}

impl Cfg {
    pub fn successors(&self, block: ValueId) -> &[ValueId] {
        self.succ.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, block: ValueId) -> &[ValueId] {
        self.pred.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Reads a block's terminator and returns its successor blocks, in a fixed
/// order (true-then-false for `BRANCH`, default-then-cases for `SWITCH`).
pub fn terminator_successors(m: &Module, block: ValueId) -> Vec<ValueId> {
    let blk = m.value(block).kind.as_block().expect("not a block");
    let Some(term) = blk.terminator() else {
        return Vec::new();
    };
    let instr = m.value(term).kind.as_instr().expect("terminator is an instruction");
    let ops = &instr.operands;
    match &instr.operator {
        Operator::Branch => vec![ops[1], ops[2]],
        Operator::Jump => vec![ops[0]],
        Operator::Switch => {
            let mut succs = vec![ops[1]];
            succs.extend(instr.switch_cases().map(|(_, b)| b));
            succs
        }
        Operator::Ret => Vec::new(),
        _ => panic!("block does not end in a terminator"),
    }
}

/// Builds the CFG for one function by walking every block's terminator.
pub fn build(m: &Module, function: ValueId) -> Cfg {
    let mut cfg = Cfg::default();
    for &block in m.function_blocks(function) {
        if m.value(block).kind.as_block().expect("not a block").deleted {
            continue;
        }
        let succs = terminator_successors(m, block);
        for &s in &succs {
            cfg.pred.entry(s).or_default().push(block);
        }
        cfg.succ.insert(block, succs);
    }
    // Ensure every live block has an (possibly empty) entry in both maps.
    for &block in m.function_blocks(function) {
        if m.value(block).kind.as_block().expect("not a block").deleted {
            continue;
        }
        cfg.succ.entry(block).or_default();
        cfg.pred.entry(block).or_default();
    }
    cfg
}

/// Blocks reachable from `function`'s entry block, in discovery order.
pub fn reachable_blocks(m: &Module, function: ValueId, cfg: &Cfg) -> Vec<ValueId> {
    let blocks = m.function_blocks(function);
    let Some(&entry) = blocks.first() else {
        return Vec::new();
    };
    let mut seen = hashbrown::HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![entry];
    seen.insert(entry);
    while let Some(b) = stack.pop() {
        order.push(b);
        for &s in cfg.successors(b) {
            if seen.insert(s) {
                stack.push(s);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, CmpOp, Const, Module};

    fn diamond() -> (Module, ValueId) {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let else_blk = m.add_block(f, "else");
        let join = m.add_block(f, "join");

        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(CmpOp::Gt, n, zero);
        b.branch(cond, then_blk, else_blk);

        b.set_insert_point(then_blk);
        b.jump(join);
        b.set_insert_point(else_blk);
        b.jump(join);

        b.set_insert_point(join);
        let phi = b.phi(i32_ty);
        b.ret(Some(phi));
        b.add_incoming(phi, then_blk, n);
        b.add_incoming(phi, else_blk, n);
        (m, f)
    }

    #[test]
    fn diamond_has_expected_pred_succ_sets() {
        let (m, f) = diamond();
        let cfg = build(&m, f);
        let blocks = m.function_blocks(f).to_vec();
        let (entry, then_blk, else_blk, join) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        assert_eq!(cfg.successors(entry), &[then_blk, else_blk]);
        assert_eq!(cfg.successors(then_blk), &[join]);
        assert_eq!(cfg.successors(else_blk), &[join]);
        assert!(cfg.successors(join).is_empty());

        let mut join_preds = cfg.predecessors(join).to_vec();
        join_preds.sort();
        let mut expected = vec![then_blk, else_blk];
        expected.sort();
        assert_eq!(join_preds, expected);
    }

    #[test]
    fn reachable_blocks_excludes_unreachable() {
        let (mut m, f) = diamond();
        let dangling = m.add_block(f, "dangling");
        {
            let mut b = Builder::new(&mut m);
            b.set_insert_point(dangling);
            b.ret(None);
        }
        let cfg = build(&m, f);
        let order = reachable_blocks(&m, f, &cfg);
        assert!(!order.contains(&dangling));
        assert_eq!(order.len(), 4);
    }
}

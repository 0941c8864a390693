//! TreeHeightBalance (§4.7): rebuilds a left-leaning chain of the same
//! associative operator (as `reassociation` produces) into a balanced
//! binary tree, shortening the critical path through the expression from
//! O(n) to O(log n) without changing which value it computes.

use crate::pass::{PassManager, Transform};
use crate::scalar::reassociation::flatten_chain;
use sysy_common::CoreResult;
use sysy_mir::{IntBinOp, Module, Operator, ValueId};

fn reassociable(op: IntBinOp) -> bool {
    matches!(op, IntBinOp::Add | IntBinOp::Mul | IntBinOp::And | IntBinOp::Or | IntBinOp::Xor)
}

/// Builds a balanced tree of fresh `IntBinary` instructions over `leaves`,
/// reusing `site` as the root so existing users of the chain stay valid.
/// Fresh intermediate instructions are attached to `block` directly before
/// `site`.
fn build_balanced(m: &mut Module, block: ValueId, site: ValueId, op: IntBinOp, leaves: Vec<ValueId>) {
    let ty = m.type_of(site);
    if leaves.len() < 2 {
        return;
    }
    let mut level = leaves;
    // Pairwise-combine level by level, creating fresh nodes for every pair
    // above the first, and leaving the unpaired odd element to the next
    // level untouched (no imbalance penalty for one straggler).
    loop {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        let is_final_level = level.len() == 2;
        while i + 1 < level.len() {
            let (a, b) = (level[i], level[i + 1]);
            let id = if is_final_level && next.is_empty() && i + 2 >= level.len() {
                m.redefine_instr(site, ty, Operator::IntBinary(op), smallvec::smallvec![a, b]);
                site
            } else {
                let name = m.fresh_name();
                let v = m.create_instr(name, ty, Operator::IntBinary(op), smallvec::smallvec![a, b]);
                m.set_block(v, Some(block), false);
                let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                let pos = blk.instrs.iter().position(|&x| x == site).expect("site in block");
                blk.instrs.insert(pos, v);
                v
            };
            next.push(id);
            i += 2;
        }
        if i < level.len() {
            next.push(level[i]);
        }
        if next.len() == 1 {
            break;
        }
        level = next;
    }
}

fn height_of(m: &Module, root: ValueId, op: IntBinOp) -> usize {
    fn go(m: &Module, v: ValueId, op: IntBinOp) -> usize {
        let Some(data) = m.value(v).kind.as_instr() else { return 0 };
        match data.operator {
            Operator::IntBinary(o) if o == op => {
                1 + go(m, data.operands[0], op).max(go(m, data.operands[1], op))
            }
            _ => 0,
        }
    }
    go(m, root, op)
}

fn balance_one(m: &mut Module, block: ValueId, instr: ValueId) -> bool {
    let op = match m.value(instr).kind.as_instr().map(|i| i.operator.clone()) {
        Some(Operator::IntBinary(op)) if reassociable(op) => op,
        _ => return false,
    };
    let leaves = flatten_chain(m, instr, op);
    if leaves.len() < 3 {
        return false;
    }
    let balanced_height = (leaves.len() as f64).log2().ceil() as usize;
    if height_of(m, instr, op) <= balanced_height {
        return false;
    }
    build_balanced(m, block, instr, op, leaves);
    true
}

/// Rebalances every deep associative chain in `function`. Returns whether
/// anything changed.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            if balance_one(m, block, instr) {
                changed = true;
            }
        }
    }
    changed
}

pub struct TreeHeightBalance;

impl Transform for TreeHeightBalance {
    fn name(&self) -> &'static str {
        "TreeHeightBalance"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if run_on_function(m, f) {
                changed = true;
                pm.mark_dirty(f);
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Const, Module};

    #[test]
    fn a_long_add_chain_gets_shorter_critical_path() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let mut acc = n;
        for i in 0..7 {
            let c = b.module.make_const(Const::Int(i));
            acc = b.int_binary(IntBinOp::Add, acc, c);
        }
        let before = height_of(&m, acc, IntBinOp::Add);
        b.ret(Some(acc));

        assert!(run_on_function(&mut m, f));
        let after = height_of(&m, acc, IntBinOp::Add);
        assert!(after < before);
        sysy_mir::verify_module(&m).expect("still well-formed");
    }
}

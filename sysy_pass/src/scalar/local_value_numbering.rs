//! LocalValueNumbering (§6 supplement, grounded in
//! `DataFlow/LocalValueNumbering.cpp`): the same redundant-expression
//! elimination as `gvn`, but scoped to a single basic block and requiring
//! no dominator-tree analysis. Run once per block, early in the O1
//! pipeline, immediately before the first whole-function
//! `GlobalValueNumbering` pass, so straight-line redundancy inside a block
//! is cleaned up cheaply before the dominance-scoped pass does the more
//! expensive cross-block work.

use crate::pass::{PassManager, Transform};
use hashbrown::HashMap;
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

#[derive(PartialEq, Eq, Hash, Clone)]
struct ExprKey(String, Vec<u32>);

fn is_pure(op: &Operator) -> bool {
    !op.has_side_effect() && !op.is_terminator() && !op.is_phi()
}

fn expr_key(m: &Module, instr: ValueId) -> Option<ExprKey> {
    let data = m.value(instr).kind.as_instr()?;
    if !is_pure(&data.operator) {
        return None;
    }
    let ids = data.operands.iter().map(|v| v.index() as u32).collect();
    Some(ExprKey(data.operator.mnemonic(), ids))
}

fn run_on_block(m: &mut Module, block: ValueId) -> bool {
    let mut changed = false;
    let mut available: HashMap<ExprKey, ValueId> = HashMap::new();
    let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
    for instr in instrs {
        let Some(key) = expr_key(m, instr) else { continue };
        if let Some(&existing) = available.get(&key) {
            m.replace_all_uses_with(instr, existing);
            m.clear_operands(instr);
            let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
            blk.instrs.retain(|&i| i != instr);
            changed = true;
        } else {
            available.insert(key, instr);
        }
    }
    changed
}

/// Runs local value numbering over every block in `function` independently
/// (no cross-block availability). Returns whether anything changed.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        if run_on_block(m, block) {
            changed = true;
        }
    }
    changed
}

pub struct LocalValueNumbering;

impl Transform for LocalValueNumbering {
    fn name(&self) -> &'static str {
        "LocalValueNumbering"
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
    use sysy_mir::{Builder, Const, IntBinOp, Module};

    #[test]
    fn duplicate_expression_in_one_block_is_removed() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c = b.module.make_const(Const::Int(1));
        let a = b.int_binary(IntBinOp::Add, n, c);
        let bb = b.int_binary(IntBinOp::Add, n, c);
        let sum = b.int_binary(IntBinOp::Add, a, bb);
        b.ret(Some(sum));

        assert!(run_on_function(&mut m, f));
    }
}

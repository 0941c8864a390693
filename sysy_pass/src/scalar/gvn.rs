//! GlobalValueNumbering (§4.7): redundant pure-expression elimination
//! scoped by dominance — a later instruction computing the same operator
//! over the same operands as an earlier, dominating one is replaced by that
//! earlier value. Walks the dominator tree so availability naturally
//! extends along every path, not just straight-line code (the local-only
//! version of this is `local_value_numbering`, run earlier in the O1
//! pipeline per §6).

use crate::dominance::DomTree;
use crate::pass::{DominanceAnalysis, PassManager, Transform};
use hashbrown::HashMap;
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

/// A hashable, structural key for a pure instruction: its operator and
/// operand list. Two instructions with equal keys compute the same value
/// wherever both are available.
#[derive(PartialEq, Eq, Hash, Clone)]
enum ExprKey {
    Simple(String, Vec<u32>),
}

fn is_pure(op: &Operator) -> bool {
    !op.has_side_effect() && !op.is_terminator() && !op.is_phi()
}

fn expr_key(m: &Module, instr: ValueId) -> Option<ExprKey> {
    let data = m.value(instr).kind.as_instr()?;
    if !is_pure(&data.operator) {
        return None;
    }
    let ids: Vec<u32> = data.operands.iter().map(|v| v.index() as u32).collect();
    Some(ExprKey::Simple(data.operator.mnemonic(), ids))
}

/// Renumbers `function`'s instructions bottom-up along the dominator tree.
/// `available` maps an expression key to the dominating value that first
/// computed it; on return from a subtree its entries for that subtree are
/// popped back off so a sibling branch doesn't see values unavailable to it.
fn gvn_block(
    m: &mut Module,
    dom: &DomTree,
    block: ValueId,
    available: &mut HashMap<ExprKey, ValueId>,
    changed: &mut bool,
) {
    let mut inserted_here = Vec::new();
    let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
    for instr in instrs {
        let Some(key) = expr_key(m, instr) else { continue };
        if let Some(&existing) = available.get(&key) {
            if existing != instr {
                m.replace_all_uses_with(instr, existing);
                m.clear_operands(instr);
                let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                blk.instrs.retain(|&i| i != instr);
                *changed = true;
                continue;
            }
        } else {
            available.insert(key.clone(), instr);
            inserted_here.push(key);
        }
    }

    for &child in dom.children(block) {
        gvn_block(m, dom, child, available, changed);
    }

    for key in inserted_here {
        available.remove(&key);
    }
}

pub fn run_on_function(m: &mut Module, function: ValueId, pm: &mut PassManager) -> bool {
    let dom = pm.analysis::<DominanceAnalysis>(m, function);
    let entry = m.function_blocks(function)[0];
    let mut available = HashMap::new();
    let mut changed = false;
    gvn_block(m, &dom, entry, &mut available, &mut changed);
    changed
}

pub struct GlobalValueNumbering;

impl Transform for GlobalValueNumbering {
    fn name(&self) -> &'static str {
        "GlobalValueNumbering"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if run_on_function(m, f, pm) {
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
    fn redundant_add_across_a_diamond_is_eliminated() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let join = m.add_block(f, "join");

        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let one = b.module.make_const(Const::Int(1));
        let sum1 = b.int_binary(IntBinOp::Add, n, one);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(sysy_mir::CmpOp::Gt, n, zero);
        b.branch(cond, then_blk, join);

        b.set_insert_point(then_blk);
        let sum2 = b.int_binary(IntBinOp::Add, n, one);
        let _ = sum2;
        b.jump(join);

        b.set_insert_point(join);
        b.ret(Some(sum1));

        let mut pm = PassManager::new();
        assert!(run_on_function(&mut m, f, &mut pm));
    }
}

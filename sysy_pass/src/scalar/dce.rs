//! Dead-instruction elimination (§4.7/§4.8): removes any instruction with
//! no users and no side effect. Run to a fixpoint since removing one dead
//! instruction can make its operands dead in turn. The array/control-flow
//! families additionally sweep unreachable blocks and dead functions; this
//! module only covers the scalar, single-function, single-instruction case
//! that the other scalar passes alternate with.

use crate::function_analysis::ModuleSummaries;
use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

/// A call to a `no_state` function is as removable as any other pure,
/// unused instruction — it has no side effect despite `Call` being marked
/// `has_side_effect()` conservatively at the operator level.
fn is_dead(m: &Module, summaries: Option<&ModuleSummaries>, instr: ValueId) -> bool {
    let Some(data) = m.value(instr).kind.as_instr() else { return false };
    if !m.users(instr).is_empty() {
        return false;
    }
    if data.operator == Operator::Call {
        let callee = data.operands[0];
        return summaries.map(|s| s.of(callee).no_state).unwrap_or(false);
    }
    !data.operator.has_side_effect() && !data.operator.is_terminator()
}

/// Removes dead instructions from `function` to a fixpoint. Returns whether
/// anything changed.
pub fn dead_instruction_eliminate_function(m: &mut Module, function: ValueId, summaries: Option<&ModuleSummaries>) -> bool {
    let mut changed_any = false;
    loop {
        let mut changed = false;
        let blocks = m.function_blocks(function).to_vec();
        for block in blocks {
            let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
            for instr in instrs {
                if is_dead(m, summaries, instr) {
                    m.clear_operands(instr);
                    let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                    blk.instrs.retain(|&i| i != instr);
                    changed = true;
                }
            }
        }
        changed_any |= changed;
        if !changed {
            break;
        }
    }
    changed_any
}

pub struct DeadInstEliminate;

impl Transform for DeadInstEliminate {
    fn name(&self) -> &'static str {
        "DeadInstEliminate"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            let summaries = pm.summaries(m);
            if dead_instruction_eliminate_function(m, f, Some(&summaries)) {
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
    fn removes_an_unused_add() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c1 = b.module.make_const(Const::Int(1));
        let c2 = b.module.make_const(Const::Int(2));
        let _unused = b.int_binary(sysy_mir::IntBinOp::Add, c1, c2);
        let ret_val = b.module.make_const(Const::Int(9));
        b.ret(Some(ret_val));

        assert!(dead_instruction_eliminate_function(&mut m, f, None));
    }

    #[test]
    fn keeps_a_store_even_with_no_users() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], m.tcx.void);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let p = b.alloc(i32_ty);
        let c = b.module.make_const(Const::Int(1));
        b.store(p, c);
        b.ret(None);

        assert!(!dead_instruction_eliminate_function(&mut m, f, None));
    }
}

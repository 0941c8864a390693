//! Dead-function / dead-argument / dead-return elimination (§4.7): three
//! whole-module cleanups over the call graph, run late in the O1 pipeline
//! after the recursion/control-flow passes have settled:
//! - `DeadFuncEliminate`: drops any non-`main`, non-runtime function with
//!   no remaining callers.
//! - `DeadFuncArgEliminate`: drops a parameter that is unused, or used only
//!   as the same-position argument of every recursive self-call (so it
//!   never actually varies).
//! - `DeadReturnEliminate`: rewrites a non-`void` function to `void` when
//!   no caller ever consumes its `call`'s result.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

pub fn dead_func_eliminate(m: &mut Module, main: ValueId) -> bool {
    let mut changed = false;
    loop {
        let mut removed_one = false;
        let functions = m.functions.clone();
        for f in functions {
            if f == main {
                continue;
            }
            let fdata = m.value(f).kind.as_function().expect("not a function");
            if !fdata.is_defined() {
                continue;
            }
            if !m.users(f).is_empty() {
                continue;
            }
            let blocks = m.function_blocks(f).to_vec();
            for b in blocks {
                let instrs = m.value(b).kind.as_block().expect("not a block").instrs.clone();
                for i in instrs {
                    m.clear_operands(i);
                }
            }
            m.functions.retain(|&g| g != f);
            removed_one = true;
            changed = true;
        }
        if !removed_one {
            break;
        }
    }
    changed
}

/// A parameter is dead if no call instruction's argument at that position
/// ever varies in a way that could be observed: either it has no uses at
/// all inside the body, or every use is itself feeding the same-position
/// argument of the function's own recursive calls (i.e. the value just
/// threads back to itself with no other consumer).
fn arg_is_dead(m: &Module, f: ValueId, param: ValueId, idx: usize) -> bool {
    let users = m.users(param);
    if users.is_empty() {
        return true;
    }
    users.iter().all(|&u| {
        m.value(u)
            .kind
            .as_instr()
            .map(|i| i.operator == Operator::Call && i.operands[0] == f && i.operands.get(idx + 1) == Some(&param))
            .unwrap_or(false)
    })
}

pub fn dead_func_arg_eliminate(m: &mut Module, f: ValueId) -> bool {
    let params = m.function_params(f).to_vec();
    let dead_positions: Vec<usize> = params.iter().enumerate().filter(|&(i, &p)| arg_is_dead(m, f, p, i)).map(|(i, _)| i).collect();
    if dead_positions.is_empty() {
        return false;
    }

    // Remove the dead parameters from every call site's argument list, in
    // reverse index order to keep earlier indices stable while mutating.
    let callers: Vec<ValueId> = m.users(f).to_vec();
    for &call in &callers {
        let Some(data) = m.value(call).kind.as_instr().cloned() else { continue };
        if data.operator != Operator::Call {
            continue;
        }
        let mut ops = data.operands.clone();
        for &idx in dead_positions.iter().rev() {
            ops.remove(idx + 1);
        }
        let ty = m.type_of(call);
        m.redefine_instr(call, ty, Operator::Call, ops);
    }

    for &idx in dead_positions.iter().rev() {
        let param = params[idx];
        m.clear_operands(param);
    }
    m.remove_params(f, &dead_positions);
    true
}

pub fn dead_return_eliminate(m: &mut Module, f: ValueId) -> bool {
    let ret_ty = m.value(f).kind.as_function().expect("not a function").ret_ty;
    if m.tcx.is_void(ret_ty) {
        return false;
    }
    let consumed = m.users(f).iter().any(|&call| !m.users(call).is_empty());
    if consumed {
        return false;
    }
    m.set_function_ret_void(f);
    for &block in m.function_blocks(f) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        let Some(term) = blk.terminator() else { continue };
        let Some(data) = m.value(term).kind.as_instr().cloned() else { continue };
        if data.operator == Operator::Ret && !data.operands.is_empty() {
            let ty = m.type_of(term);
            m.clear_operands(term);
            m.redefine_instr(term, ty, Operator::Ret, smallvec::smallvec![]);
        }
    }
    true
}

pub struct DeadFuncEliminate;
impl Transform for DeadFuncEliminate {
    fn name(&self) -> &'static str {
        "DeadFuncEliminate"
    }
    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let Some(&main) = m.functions.iter().find(|&&f| m.name_of(f) == "main") else {
            return Ok(false);
        };
        let changed = dead_func_eliminate(m, main);
        if changed {
            pm.invalidate_summaries();
        }
        Ok(changed)
    }
}

pub struct DeadFuncArgEliminate;
impl Transform for DeadFuncArgEliminate {
    fn name(&self) -> &'static str {
        "DeadFuncArgEliminate"
    }
    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if m.name_of(f) == "main" || !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if dead_func_arg_eliminate(m, f) {
                changed = true;
                pm.mark_dirty(f);
            }
        }
        if changed {
            pm.invalidate_summaries();
        }
        Ok(changed)
    }
}

pub struct DeadReturnEliminate;
impl Transform for DeadReturnEliminate {
    fn name(&self) -> &'static str {
        "DeadReturnEliminate"
    }
    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if m.name_of(f) == "main" || !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if dead_return_eliminate(m, f) {
                changed = true;
                pm.mark_dirty(f);
            }
        }
        if changed {
            pm.invalidate_summaries();
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Const, Module};

    #[test]
    fn uncalled_non_main_function_is_removed() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let main = m.add_function("main", &[], i32_ty);
        {
            let mut b = Builder::new(&mut m);
            let entry = m.add_block(main, "entry");
            b.set_insert_point(entry);
            let c = b.module.make_const(Const::Int(0));
            b.ret(Some(c));
        }
        let unused = m.add_function("unused", &[], i32_ty);
        {
            let mut b = Builder::new(&mut m);
            let entry = m.add_block(unused, "entry");
            b.set_insert_point(entry);
            let c = b.module.make_const(Const::Int(0));
            b.ret(Some(c));
        }

        assert!(dead_func_eliminate(&mut m, main));
        assert!(!m.functions.contains(&unused));
    }

    #[test]
    fn ignored_return_value_is_turned_void() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let main = m.add_function("main", &[], i32_ty);
        let g = m.add_function("g", &[], i32_ty);
        {
            let mut b = Builder::new(&mut m);
            let entry = m.add_block(g, "entry");
            b.set_insert_point(entry);
            let c = b.module.make_const(Const::Int(7));
            b.ret(Some(c));
        }
        {
            let mut b = Builder::new(&mut m);
            let entry = m.add_block(main, "entry");
            b.set_insert_point(entry);
            b.call(g, &[]);
            let zero = b.module.make_const(Const::Int(0));
            b.ret(Some(zero));
        }

        assert!(dead_return_eliminate(&mut m, g));
        let ret_ty = m.value(g).kind.as_function().unwrap().ret_ty;
        assert!(m.tcx.is_void(ret_ty));
    }
}

//! Single-return transform (§4.9): merges every `ret` in a function into
//! one return block with a PHI of the returned values, a precondition the
//! interval analysis relies on (it abstract-interprets exit state once per
//! function rather than per return site). A `void`-returning function with
//! multiple `ret`s is merged the same way, minus the PHI.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

pub fn run_on_function(m: &mut Module, f: ValueId) -> bool {
    let rets: Vec<ValueId> = m
        .function_blocks(f)
        .iter()
        .filter_map(|&b| {
            let blk = m.value(b).kind.as_block().expect("not a block");
            let term = blk.terminator()?;
            (m.value(term).kind.as_instr()?.operator == Operator::Ret).then_some(term)
        })
        .collect();
    if rets.len() <= 1 {
        return false;
    }

    let is_void = m.value(f).kind.as_function().expect("not a function").ret_ty == m.tcx.void;
    let exit = m.add_block(f, "single_ret.exit");
    let phi = if is_void {
        None
    } else {
        let ty = m.value(f).kind.as_function().unwrap().ret_ty;
        let phi = m.create_instr(m.fresh_name(), ty, Operator::Phi, smallvec::smallvec![]);
        m.set_block(phi, Some(exit), true);
        Some(phi)
    };
    {
        let ret_ty = m.value(f).kind.as_function().unwrap().ret_ty;
        let ret = m.create_instr(
            m.fresh_name(),
            ret_ty,
            Operator::Ret,
            phi.map(|p| smallvec::smallvec![p]).unwrap_or_default(),
        );
        m.set_block(ret, Some(exit), true);
    }

    for &term in &rets {
        let parent = m.value(term).kind.as_instr().expect("terminator").parent.expect("attached");
        if let (Some(phi), Some(&v)) = (phi, m.value(term).kind.as_instr().unwrap().operands.first()) {
            sysy_mir::Builder::new(m).add_incoming(phi, parent, v);
        }
        let ty = m.type_of(term);
        m.clear_operands(term);
        m.redefine_instr(term, ty, Operator::Jump, smallvec::smallvec![exit]);
    }

    true
}

pub struct SingleReturn;

impl Transform for SingleReturn {
    fn name(&self) -> &'static str {
        "SingleReturn"
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
    use sysy_mir::{Builder, CmpOp, Const, Module};

    #[test]
    fn two_returns_merge_into_one_with_a_phi() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let else_blk = m.add_block(f, "else");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(CmpOp::Gt, n, zero);
        b.branch(cond, then_blk, else_blk);
        b.set_insert_point(then_blk);
        let one = b.module.make_const(Const::Int(1));
        b.ret(Some(one));
        b.set_insert_point(else_blk);
        let two = b.module.make_const(Const::Int(2));
        b.ret(Some(two));

        assert!(run_on_function(&mut m, f));
        let ret_count = m
            .function_blocks(f)
            .iter()
            .filter(|&&b| {
                m.value(b)
                    .kind
                    .as_block()
                    .and_then(|d| d.terminator())
                    .map(|t| m.value(t).kind.as_instr().unwrap().operator == Operator::Ret)
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(ret_count, 1);
    }
}

//! Constant folding (§4.7): local, instruction-at-a-time. Every
//! arithmetic/comparison/conversion instruction whose operands are
//! constants is evaluated via `safe_cal` and RAUW'd with the result;
//! overflow abandons the fold for that instruction.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Const, Eval, EvalOp, Module, Operator, ValueId};

pub(crate) fn int_op_to_eval(op: sysy_mir::IntBinOp) -> EvalOp {
    use sysy_mir::IntBinOp::*;
    match op {
        Add => EvalOp::Add,
        Sub => EvalOp::Sub,
        Mul => EvalOp::Mul,
        Div => EvalOp::Div,
        Mod => EvalOp::Mod,
        And => EvalOp::And,
        Or => EvalOp::Or,
        Xor => EvalOp::Xor,
        Shl => EvalOp::Shl,
        Lshr => EvalOp::Lshr,
        Ashr => EvalOp::Ashr,
        Smax => EvalOp::Smax,
        Smin => EvalOp::Smin,
    }
}

pub(crate) fn float_op_to_eval(op: sysy_mir::FloatBinOp) -> EvalOp {
    use sysy_mir::FloatBinOp::*;
    match op {
        Add => EvalOp::Add,
        Sub => EvalOp::Sub,
        Mul => EvalOp::Mul,
        Div => EvalOp::Div,
        Mod => EvalOp::Mod,
        Smax => EvalOp::Smax,
        Smin => EvalOp::Smin,
    }
}

pub(crate) fn cmp_op_to_eval(op: sysy_mir::CmpOp) -> EvalOp {
    use sysy_mir::CmpOp::*;
    match op {
        Eq => EvalOp::Eq,
        Ne => EvalOp::Ne,
        Lt => EvalOp::Lt,
        Le => EvalOp::Le,
        Gt => EvalOp::Gt,
        Ge => EvalOp::Ge,
    }
}

fn as_const(m: &Module, v: ValueId) -> Option<Const> {
    match &m.value(v).kind {
        sysy_mir::ValueKind::Const(c) => Some(*c),
        _ => None,
    }
}

/// Attempts to fold a single instruction; returns the replacement constant
/// value id if it folded.
fn try_fold(m: &mut Module, instr: ValueId) -> Option<ValueId> {
    let data = m.value(instr).kind.as_instr()?;
    let ops = data.operands.clone();
    let result_is_float = m.tcx.is_float(m.value(instr).ty);

    let folded: Option<Const> = match &data.operator {
        Operator::IntBinary(op) => {
            let a = as_const(m, ops[0])?;
            let b = as_const(m, ops[1])?;
            safe_cal_wrap(a.as_eval(), b.as_eval(), int_op_to_eval(*op), result_is_float)
        }
        Operator::FloatBinary(op) => {
            let a = as_const(m, ops[0])?;
            let b = as_const(m, ops[1])?;
            safe_cal_wrap(a.as_eval(), b.as_eval(), float_op_to_eval(*op), result_is_float)
        }
        Operator::Icmp(op) | Operator::Fcmp(op) => {
            let a = as_const(m, ops[0])?;
            let b = as_const(m, ops[1])?;
            sysy_mir::safe_cal(a.as_eval(), b.as_eval(), cmp_op_to_eval(*op))
                .and_then(|e| e.to_const_int())
        }
        Operator::Fneg => {
            let a = as_const(m, ops[0])?;
            match a {
                Const::Double(d) => Some(Const::Double(-d)),
                _ => None,
            }
        }
        Operator::Zext => {
            let a = as_const(m, ops[0])?;
            match a {
                Const::Bool(b) => Some(Const::Int(b as i32)),
                other => Some(other),
            }
        }
        Operator::Fptosi => match as_const(m, ops[0])? {
            Const::Double(d) => Some(Const::Int(d as i32)),
            _ => None,
        },
        Operator::Sitofp => match as_const(m, ops[0])? {
            Const::Int(i) => Some(Const::Double(i as f64)),
            _ => None,
        },
        _ => None,
    };

    folded.map(|c| m.make_const(c))
}

pub(crate) fn safe_cal_wrap(a: Eval, b: Eval, op: EvalOp, result_is_float: bool) -> Option<Const> {
    sysy_mir::safe_cal(a, b, op).and_then(|e| e.to_const(result_is_float))
}

/// Folds every foldable instruction across the whole function; repeats
/// until no instruction folds further (users of a fold can themselves
/// become foldable). Returns whether anything changed.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed_any = false;
    loop {
        let mut changed = false;
        let blocks = m.function_blocks(function).to_vec();
        for block in blocks {
            let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
            for instr in instrs {
                if m.value(instr).kind.as_instr().is_none() {
                    continue;
                }
                if let Some(folded) = try_fold(m, instr) {
                    m.replace_all_uses_with(instr, folded);
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

pub struct ConstantFolding;

impl Transform for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
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
    use sysy_mir::Builder;

    #[test]
    fn folds_add_of_two_constants() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c3 = b.module.make_const(Const::Int(3));
        let c4 = b.module.make_const(Const::Int(4));
        let sum = b.int_binary(sysy_mir::IntBinOp::Add, c3, c4);
        b.ret(Some(sum));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 7"));
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c3 = b.module.make_const(Const::Int(3));
        let zero = b.module.make_const(Const::Int(0));
        let div = b.int_binary(sysy_mir::IntBinOp::Div, c3, zero);
        b.ret(Some(div));

        assert!(!run_on_function(&mut m, f));
    }
}

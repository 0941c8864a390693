//! StandardizeBinary (§4.7): canonicalizes commutative binaries so a
//! constant operand (if any) sits on the right, and reverses comparisons
//! accordingly so later passes (algebraic simplification, GVN) only need to
//! match one shape.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{CmpOp, FloatBinOp, IntBinOp, Module, Operator, ValueId};

fn is_const(m: &Module, v: ValueId) -> bool {
    matches!(m.value(v).kind, sysy_mir::ValueKind::Const(_))
}

fn commutative_int(op: IntBinOp) -> bool {
    matches!(op, IntBinOp::Add | IntBinOp::Mul | IntBinOp::And | IntBinOp::Or | IntBinOp::Xor | IntBinOp::Smax | IntBinOp::Smin)
}

fn commutative_float(op: FloatBinOp) -> bool {
    matches!(op, FloatBinOp::Add | FloatBinOp::Mul | FloatBinOp::Smax | FloatBinOp::Smin)
}

fn reverse_cmp(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Eq => CmpOp::Eq,
        CmpOp::Ne => CmpOp::Ne,
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Ge => CmpOp::Le,
    }
}

/// Standardizes one instruction in place; returns whether it changed.
fn standardize_one(m: &mut Module, instr: ValueId) -> bool {
    let data = match m.value(instr).kind.as_instr() {
        Some(d) => d.clone(),
        None => return false,
    };
    let ty = m.type_of(instr);

    match data.operator {
        Operator::IntBinary(op) if commutative_int(op) => {
            let (a, b) = (data.operands[0], data.operands[1]);
            if is_const(m, a) && !is_const(m, b) {
                m.redefine_instr(instr, ty, Operator::IntBinary(op), smallvec::smallvec![b, a]);
                return true;
            }
            false
        }
        Operator::FloatBinary(op) if commutative_float(op) => {
            let (a, b) = (data.operands[0], data.operands[1]);
            if is_const(m, a) && !is_const(m, b) {
                m.redefine_instr(instr, ty, Operator::FloatBinary(op), smallvec::smallvec![b, a]);
                return true;
            }
            false
        }
        Operator::Icmp(op) => {
            let (a, b) = (data.operands[0], data.operands[1]);
            if is_const(m, a) && !is_const(m, b) {
                m.redefine_instr(instr, ty, Operator::Icmp(reverse_cmp(op)), smallvec::smallvec![b, a]);
                return true;
            }
            false
        }
        Operator::Fcmp(op) => {
            let (a, b) = (data.operands[0], data.operands[1]);
            if is_const(m, a) && !is_const(m, b) {
                m.redefine_instr(instr, ty, Operator::Fcmp(reverse_cmp(op)), smallvec::smallvec![b, a]);
                return true;
            }
            false
        }
        _ => false,
    }
}

/// Standardizes every binary/comparison instruction in `function`. Returns
/// whether anything changed.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            if standardize_one(m, instr) {
                changed = true;
            }
        }
    }
    changed
}

pub struct StandardizeBinary;

impl Transform for StandardizeBinary {
    fn name(&self) -> &'static str {
        "StandardizeBinary"
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
    fn constant_on_the_left_moves_right() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c = b.module.make_const(Const::Int(5));
        let sum = b.int_binary(IntBinOp::Add, c, n);
        b.ret(Some(sum));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("add i32 %arg0, 5"));
    }

    #[test]
    fn comparison_reverses_when_flipped() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c = b.module.make_const(Const::Int(5));
        let cmp = b.icmp(CmpOp::Lt, c, n);
        let ext = b.zext(cmp, i32_ty);
        b.ret(Some(ext));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("icmp.gt i1 %arg0, 5"));
    }
}

//! Algebraic simplification (§4.7): the fixed set of identities named in
//! the spec, run to a fixpoint. Per §9's explicit warning, this is the
//! *complete* set — no identity beyond what is listed here is added.

use crate::pass::{PassManager, Transform};
use crate::scalar::dce::dead_instruction_eliminate_function;
use crate::scalar::standardize_binary::run_on_function as standardize;
use sysy_common::CoreResult;
use sysy_mir::{Const, FloatBinOp, FloatTernOp, IntBinOp, Module, Operator, ValueId};

fn const_int(m: &Module, v: ValueId) -> Option<i32> {
    match &m.value(v).kind {
        sysy_mir::ValueKind::Const(Const::Int(i)) => Some(*i),
        _ => None,
    }
}

fn defining_int_binop(m: &Module, v: ValueId) -> Option<(IntBinOp, ValueId, ValueId)> {
    let data = m.value(v).kind.as_instr()?;
    match data.operator {
        Operator::IntBinary(op) => Some((op, data.operands[0], data.operands[1])),
        _ => None,
    }
}

fn defining_float_binop(m: &Module, v: ValueId) -> Option<(FloatBinOp, ValueId, ValueId)> {
    let data = m.value(v).kind.as_instr()?;
    match data.operator {
        Operator::FloatBinary(op) => Some((op, data.operands[0], data.operands[1])),
        _ => None,
    }
}

fn defining_fneg(m: &Module, v: ValueId) -> Option<ValueId> {
    let data = m.value(v).kind.as_instr()?;
    match data.operator {
        Operator::Fneg => Some(data.operands[0]),
        _ => None,
    }
}

enum Rewrite {
    /// Replace with an existing value.
    UseValue(ValueId),
    /// Replace with a fresh int binary `op(lhs, rhs)`.
    NewIntBinary(IntBinOp, ValueId, ValueId),
    /// Replace with a fresh float ternary.
    NewFloatTernary(FloatTernOp, ValueId, ValueId, ValueId),
}

/// Tries every identity in turn against one instruction; the first match
/// wins (the identities are disjoint in practice for this operator set).
fn simplify_one(m: &mut Module, instr: ValueId) -> Option<Rewrite> {
    let data = m.value(instr).kind.as_instr()?.clone();
    match data.operator {
        Operator::IntBinary(op) => simplify_int_binary(m, instr, op, data.operands[0], data.operands[1]),
        Operator::FloatBinary(op) => simplify_float_binary(m, op, data.operands[0], data.operands[1]),
        _ => None,
    }
}

fn simplify_int_binary(m: &mut Module, site: ValueId, op: IntBinOp, a: ValueId, b: ValueId) -> Option<Rewrite> {
    let cb = const_int(m, b);
    let ca = const_int(m, a);

    match op {
        IntBinOp::Add => {
            if cb == Some(0) {
                return Some(Rewrite::UseValue(a));
            }
            if ca == Some(0) {
                return Some(Rewrite::UseValue(b));
            }
            if a == b {
                let two = m.make_const(Const::Int(2));
                return Some(Rewrite::NewIntBinary(IntBinOp::Mul, a, two));
            }
            // (a + c1) + c2 = a + (c1 + c2)
            if let (Some((IntBinOp::Add, inner_a, inner_c1)), Some(c2)) = (defining_int_binop(m, a), cb) {
                if let Some(c1) = const_int(m, inner_c1) {
                    let folded = m.make_const(Const::Int(c1.wrapping_add(c2)));
                    return Some(Rewrite::NewIntBinary(IntBinOp::Add, inner_a, folded));
                }
            }
            // (a - c1) + c2 = a + (c2 - c1)
            if let (Some((IntBinOp::Sub, inner_a, inner_c1)), Some(c2)) = (defining_int_binop(m, a), cb) {
                if let Some(c1) = const_int(m, inner_c1) {
                    let folded = m.make_const(Const::Int(c2.wrapping_sub(c1)));
                    return Some(Rewrite::NewIntBinary(IntBinOp::Add, inner_a, folded));
                }
            }
            // (c1 - a) + c2 = (c1 + c2) - a
            if let (Some((IntBinOp::Sub, inner_c1, inner_a)), Some(c2)) = (defining_int_binop(m, a), cb) {
                if let Some(c1) = const_int(m, inner_c1) {
                    let folded = m.make_const(Const::Int(c1.wrapping_add(c2)));
                    return Some(Rewrite::NewIntBinary(IntBinOp::Sub, folded, inner_a));
                }
            }
            // a + (0 - b) = a - b
            if let Some((IntBinOp::Sub, zero, inner_b)) = defining_int_binop(m, b) {
                if const_int(m, zero) == Some(0) {
                    return Some(Rewrite::NewIntBinary(IntBinOp::Sub, a, inner_b));
                }
            }
            None
        }
        IntBinOp::Sub => {
            if cb == Some(0) {
                return Some(Rewrite::UseValue(a));
            }
            if a == b {
                return Some(Rewrite::UseValue(m.make_const(Const::Int(0))));
            }
            // (a + b) - a = b ; (a + b) - b = a
            if let Some((IntBinOp::Add, x, y)) = defining_int_binop(m, a) {
                if y == b {
                    return Some(Rewrite::UseValue(x));
                }
                if x == b {
                    return Some(Rewrite::UseValue(y));
                }
            }
            // a - (a + b) = 0 - b
            if let Some((IntBinOp::Add, x, y)) = defining_int_binop(m, b) {
                if x == a {
                    let zero = m.make_const(Const::Int(0));
                    return Some(Rewrite::NewIntBinary(IntBinOp::Sub, zero, y));
                }
                if y == a {
                    let zero = m.make_const(Const::Int(0));
                    return Some(Rewrite::NewIntBinary(IntBinOp::Sub, zero, x));
                }
            }
            None
        }
        IntBinOp::Mul => {
            if cb == Some(0) || ca == Some(0) {
                return Some(Rewrite::UseValue(m.make_const(Const::Int(0))));
            }
            if cb == Some(1) {
                return Some(Rewrite::UseValue(a));
            }
            if ca == Some(1) {
                return Some(Rewrite::UseValue(b));
            }
            if cb == Some(-1) {
                let zero = m.make_const(Const::Int(0));
                return Some(Rewrite::NewIntBinary(IntBinOp::Sub, zero, a));
            }
            if ca == Some(-1) {
                let zero = m.make_const(Const::Int(0));
                return Some(Rewrite::NewIntBinary(IntBinOp::Sub, zero, b));
            }
            // (-a) * c = a * (-c)
            if let (Some(inner), Some(c)) = (defining_neg_int(m, a), cb) {
                let negated = m.make_const(Const::Int(c.wrapping_neg()));
                return Some(Rewrite::NewIntBinary(IntBinOp::Mul, inner, negated));
            }
            // (a * c1) * c2 = a * (c1*c2)
            if let (Some((IntBinOp::Mul, inner_a, inner_c1)), Some(c2)) = (defining_int_binop(m, a), cb) {
                if let Some(c1) = const_int(m, inner_c1) {
                    let folded = m.make_const(Const::Int(c1.wrapping_mul(c2)));
                    return Some(Rewrite::NewIntBinary(IntBinOp::Mul, inner_a, folded));
                }
            }
            let _ = site;
            None
        }
        IntBinOp::Div => {
            if cb == Some(1) {
                return Some(Rewrite::UseValue(a));
            }
            if a == b {
                return Some(Rewrite::UseValue(m.make_const(Const::Int(1))));
            }
            if ca == Some(0) {
                return Some(Rewrite::UseValue(m.make_const(Const::Int(0))));
            }
            // (a * c2) / c1 = a * (c2 / c1) when c1 divides c2 exactly.
            if let (Some((IntBinOp::Mul, inner_a, inner_c2)), Some(c1)) = (defining_int_binop(m, a), cb) {
                if c1 != 0 {
                    if let Some(c2) = const_int(m, inner_c2) {
                        if c2 % c1 == 0 {
                            let folded = m.make_const(Const::Int(c2 / c1));
                            return Some(Rewrite::NewIntBinary(IntBinOp::Mul, inner_a, folded));
                        }
                    }
                }
            }
            None
        }
        IntBinOp::Mod => {
            if cb == Some(1) || cb == Some(-1) {
                return Some(Rewrite::UseValue(m.make_const(Const::Int(0))));
            }
            None
        }
        IntBinOp::Smax => {
            if a == b {
                return Some(Rewrite::UseValue(a));
            }
            // max(min(a,b), c) = c if a == c or b == c.
            if let Some((IntBinOp::Smin, x, y)) = defining_int_binop(m, a) {
                if x == b || y == b {
                    return Some(Rewrite::UseValue(b));
                }
            }
            if let Some((IntBinOp::Smin, x, y)) = defining_int_binop(m, b) {
                if x == a || y == a {
                    return Some(Rewrite::UseValue(a));
                }
            }
            None
        }
        IntBinOp::Smin => {
            if a == b {
                return Some(Rewrite::UseValue(a));
            }
            if let Some((IntBinOp::Smax, x, y)) = defining_int_binop(m, a) {
                if x == b || y == b {
                    return Some(Rewrite::UseValue(b));
                }
            }
            if let Some((IntBinOp::Smax, x, y)) = defining_int_binop(m, b) {
                if x == a || y == a {
                    return Some(Rewrite::UseValue(a));
                }
            }
            None
        }
        _ => None,
    }
}

fn defining_neg_int(m: &Module, v: ValueId) -> Option<ValueId> {
    // `0 - a`, the only representation of integer negation in this IR.
    if let Some((IntBinOp::Sub, zero, a)) = defining_int_binop(m, v) {
        if const_int(m, zero) == Some(0) {
            return Some(a);
        }
    }
    None
}

fn simplify_float_binary(m: &mut Module, op: FloatBinOp, a: ValueId, b: ValueId) -> Option<Rewrite> {
    match op {
        // (x*y) + z -> FMADD(x,y,z)
        FloatBinOp::Add => {
            if let Some((FloatBinOp::Mul, x, y)) = defining_float_binop(m, a) {
                return Some(Rewrite::NewFloatTernary(FloatTernOp::Fmadd, x, y, b));
            }
            if let Some((FloatBinOp::Mul, x, y)) = defining_float_binop(m, b) {
                return Some(Rewrite::NewFloatTernary(FloatTernOp::Fmadd, x, y, a));
            }
            None
        }
        // z - (x*y) -> FNMSUB(x,y,z) computing z - x*y
        FloatBinOp::Sub => {
            if let Some((FloatBinOp::Mul, x, y)) = defining_float_binop(m, b) {
                return Some(Rewrite::NewFloatTernary(FloatTernOp::Fnmsub, x, y, a));
            }
            None
        }
        _ => None,
    }
}

fn apply(m: &mut Module, block: ValueId, site: ValueId, rewrite: Rewrite) {
    match rewrite {
        Rewrite::UseValue(v) => {
            m.replace_all_uses_with(site, v);
            m.clear_operands(site);
            let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
            blk.instrs.retain(|&i| i != site);
        }
        Rewrite::NewIntBinary(op, lhs, rhs) => {
            let ty = m.type_of(lhs);
            m.redefine_instr(site, ty, Operator::IntBinary(op), smallvec::smallvec![lhs, rhs]);
        }
        Rewrite::NewFloatTernary(op, x, y, z) => {
            let ty = m.type_of(x);
            m.redefine_instr(site, ty, Operator::FloatTernary(op), smallvec::smallvec![x, y, z]);
        }
    }
}

/// Runs algebraic simplification to a fixpoint, alternating with
/// `StandardizeBinary` and dead-instruction elimination as §4.7 specifies.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed_any = false;
    loop {
        standardize(m, function);
        let mut changed = false;
        let blocks = m.function_blocks(function).to_vec();
        for block in blocks {
            let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
            for instr in instrs {
                if let Some(rewrite) = simplify_one(m, instr) {
                    apply(m, block, instr, rewrite);
                    changed = true;
                }
            }
        }
        dead_instruction_eliminate_function(m, function, None);
        changed_any |= changed;
        if !changed {
            break;
        }
    }
    changed_any
}

pub struct AlgebraicSimplify;

impl Transform for AlgebraicSimplify {
    fn name(&self) -> &'static str {
        "AlgebraicSimplify"
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
    fn add_zero_is_removed() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let sum = b.int_binary(IntBinOp::Add, n, zero);
        b.ret(Some(sum));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 %arg0"));
    }

    #[test]
    fn mul_by_negative_one_becomes_sub_from_zero() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let neg1 = b.module.make_const(Const::Int(-1));
        let r = b.int_binary(IntBinOp::Mul, n, neg1);
        b.ret(Some(r));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("sub i32 0,"));
    }

    #[test]
    fn max_of_identical_operands_collapses() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let r = b.int_binary(IntBinOp::Smax, n, n);
        b.ret(Some(r));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 %arg0"));
    }
}

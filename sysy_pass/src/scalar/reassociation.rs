//! Reassociation (§4.7): canonicalizes chains of the same associative,
//! commutative integer operator (`add`/`mul`/`and`/`or`/`xor`) into a
//! fixed leaf order — constants folded together and moved to the end of
//! the chain — so that equivalent expressions written in different
//! operand orders become syntactically identical for GVN, and so any
//! constant sub-expression in the chain collapses to one operand instead
//! of being scattered across several instructions.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Const, IntBinOp, Module, Operator, ValueId};

fn reassociable(op: IntBinOp) -> bool {
    matches!(op, IntBinOp::Add | IntBinOp::Mul | IntBinOp::And | IntBinOp::Or | IntBinOp::Xor)
}

fn as_binop(m: &Module, v: ValueId, op: IntBinOp) -> Option<(ValueId, ValueId)> {
    let data = m.value(v).kind.as_instr()?;
    match data.operator {
        Operator::IntBinary(o) if o == op => Some((data.operands[0], data.operands[1])),
        _ => None,
    }
}

/// Flattens a chain of the same reassociable operator rooted at `root` into
/// its leaves, stopping at any operand used outside this chain (since
/// rewriting a shared sub-expression would duplicate work rather than just
/// reorder it).
pub(crate) fn flatten_chain(m: &Module, root: ValueId, op: IntBinOp) -> Vec<ValueId> {
    let mut leaves = Vec::new();
    let mut stack = vec![root];
    while let Some(v) = stack.pop() {
        if v != root && m.users(v).len() > 1 {
            leaves.push(v);
            continue;
        }
        match as_binop(m, v, op) {
            Some((a, b)) => {
                stack.push(a);
                stack.push(b);
            }
            None => leaves.push(v),
        }
    }
    leaves
}

fn identity_for(op: IntBinOp) -> i32 {
    match op {
        IntBinOp::Add | IntBinOp::Or | IntBinOp::Xor => 0,
        IntBinOp::Mul | IntBinOp::And => -1, // unused for And/Mul folding path below except Mul uses 1
        _ => 0,
    }
}

fn fold_constants(op: IntBinOp, consts: &[i32]) -> i32 {
    match op {
        IntBinOp::Add => consts.iter().fold(0i32, |a, &b| a.wrapping_add(b)),
        IntBinOp::Mul => consts.iter().fold(1i32, |a, &b| a.wrapping_mul(b)),
        IntBinOp::And => consts.iter().fold(-1i32, |a, &b| a & b),
        IntBinOp::Or => consts.iter().fold(0i32, |a, &b| a | b),
        IntBinOp::Xor => consts.iter().fold(0i32, |a, &b| a ^ b),
        _ => identity_for(op),
    }
}

/// Rebuilds a flattened leaf list into a left-associated chain of fresh
/// `IntBinary` instructions ending at `site` (the original root, whose
/// identity is preserved so existing users stay valid). Non-constant
/// leaves are ordered by `ValueId` for a canonical, order-independent shape.
fn rebuild_chain(m: &mut Module, site: ValueId, op: IntBinOp, leaves: Vec<ValueId>) {
    let ty = m.type_of(site);
    let mut consts = Vec::new();
    let mut vars = Vec::new();
    for leaf in leaves {
        match m.value(leaf).kind {
            sysy_mir::ValueKind::Const(Const::Int(i)) => consts.push(i),
            _ => vars.push(leaf),
        }
    }
    vars.sort_by_key(|v| v.index());

    let folded = fold_constants(op, &consts);

    let mut ordered = vars;
    let skip_const = match op {
        IntBinOp::Add | IntBinOp::Or | IntBinOp::Xor => folded == 0,
        IntBinOp::Mul => folded == 1,
        IntBinOp::And => folded == -1,
        _ => false,
    };
    let const_value = if skip_const { None } else { Some(m.make_const(Const::Int(folded))) };
    if let Some(c) = const_value {
        ordered.push(c);
    }

    if ordered.is_empty() {
        // Every leaf was a constant and it folded to the operator's
        // identity-of-nothing case; fall back to the identity element.
        let c = m.make_const(Const::Int(folded));
        m.redefine_instr(site, ty, Operator::IntBinary(op), smallvec::smallvec![c, c]);
        return;
    }
    if ordered.len() == 1 {
        let only = ordered[0];
        let ident = m.make_const(Const::Int(match op {
            IntBinOp::Mul => 1,
            IntBinOp::And => -1,
            _ => 0,
        }));
        m.redefine_instr(site, ty, Operator::IntBinary(op), smallvec::smallvec![only, ident]);
        return;
    }

    // Rebuild as a left-leaning chain of fresh intermediate instructions,
    // reusing `site` as the final (top) node.
    let mut acc = ordered[0];
    for &next in &ordered[1..ordered.len() - 1] {
        let name = m.fresh_name();
        acc = m.create_instr(name, ty, Operator::IntBinary(op), smallvec::smallvec![acc, next]);
    }
    let last = ordered[ordered.len() - 1];
    m.redefine_instr(site, ty, Operator::IntBinary(op), smallvec::smallvec![acc, last]);
}

fn reassociate_one(m: &mut Module, instr: ValueId) -> bool {
    let op = match m.value(instr).kind.as_instr().map(|i| i.operator.clone()) {
        Some(Operator::IntBinary(op)) if reassociable(op) => op,
        _ => return false,
    };
    let leaves = flatten_chain(m, instr, op);
    if leaves.len() <= 2 {
        return false;
    }
    rebuild_chain(m, instr, op, leaves);
    true
}

/// Reassociates every top-level reassociable chain in `function`. A "top
/// level" instruction is one whose parent block still references it at the
/// time of the scan; nested intermediate nodes created by an earlier
/// rewrite in the same pass are skipped since they are already canonical.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            if reassociate_one(m, instr) {
                changed = true;
                // A rewritten chain introduces new intermediate instructions
                // that are not yet attached to any block's instruction list;
                // they must be inserted before `instr` for verification and
                // codegen to see them.
                attach_new_operands(m, block, instr);
            }
        }
    }
    changed
}

/// After `rebuild_chain` creates fresh intermediate instructions via
/// `create_instr`, they are unattached (no parent, not in any block's
/// instruction list). Walks `site`'s operand tree and inserts every
/// unattached node directly before `site` in `block`.
fn attach_new_operands(m: &mut Module, block: ValueId, site: ValueId) {
    let mut stack = vec![site];
    let mut to_attach = Vec::new();
    while let Some(v) = stack.pop() {
        let Some(data) = m.value(v).kind.as_instr() else { continue };
        if v != site && data.parent.is_none() {
            to_attach.push(v);
            stack.push(data.operands[0]);
        }
    }
    to_attach.reverse();
    for v in to_attach {
        m.set_block(v, Some(block), false);
        let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
        let pos = blk.instrs.iter().position(|&i| i == site).expect("site is in this block");
        blk.instrs.insert(pos, v);
    }
}

pub struct Reassociation;

impl Transform for Reassociation {
    fn name(&self) -> &'static str {
        "Reassociation"
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
    fn folds_constants_in_an_add_chain() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c1 = b.module.make_const(Const::Int(1));
        let c2 = b.module.make_const(Const::Int(2));
        let t1 = b.int_binary(IntBinOp::Add, n, c1);
        let t2 = b.int_binary(IntBinOp::Add, t1, c2);
        b.ret(Some(t2));

        assert!(run_on_function(&mut m, f));
        sysy_mir::verify_module(&m).expect("still well-formed");
        let text = sysy_mir::print_module(&m);
        assert!(text.contains(", 3") || text.contains("3,"));
    }
}

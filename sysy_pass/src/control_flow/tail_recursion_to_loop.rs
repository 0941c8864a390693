//! Tail-recursion-to-loop (§4.9): a `no_state` recursive function whose
//! only self-calls sit immediately before a `ret` — either returned
//! directly, or combined with the call's result by an associative,
//! commutative operator with an identity element — is rewritten into a
//! single-entry loop. A new entry block feeds a per-argument PHI (and, if
//! an accumulator is present, an accumulator PHI seeded with the
//! operator's identity); the call is replaced with a jump back to the new
//! entry, and the accumulator PHI picks up the combined value instead.

use crate::pass::{FunctionSummaryAnalysis, PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Const, IntBinOp, Module, Operator, ValueId};

/// `acc = acc OP call`, with `OP` associative-commutative and having an
/// identity element representable as an integer constant.
fn identity_of(op: IntBinOp) -> Option<i32> {
    match op {
        IntBinOp::Add | IntBinOp::Or | IntBinOp::Xor => Some(0),
        IntBinOp::Mul | IntBinOp::And => Some(1),
        IntBinOp::Smax => Some(i32::MIN),
        IntBinOp::Smin => Some(i32::MAX),
        _ => None,
    }
}

struct TailSite {
    block: ValueId,
    call: ValueId,
    /// `Some(op)` if the call's result feeds an accumulating binop before
    /// the return; `None` if the call's result is returned directly.
    accumulate: Option<IntBinOp>,
}

/// Finds every block ending in `ret (call f, args)` or
/// `ret (binop acc, (call f, args))` / `ret (binop (call f, args), acc)`.
fn find_tail_sites(m: &Module, f: ValueId) -> Option<Vec<TailSite>> {
    let mut sites = Vec::new();
    for &block in m.function_blocks(f) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        let Some(term) = blk.terminator() else { continue };
        let ret = m.value(term).kind.as_instr().expect("terminator");
        if ret.operator != Operator::Ret || ret.operands.is_empty() {
            continue;
        }
        let returned = ret.operands[0];
        if let Some(call) = m.value(returned).kind.as_instr() {
            if call.operator == Operator::Call && call.operands[0] == f {
                sites.push(TailSite { block, call: returned, accumulate: None });
                continue;
            }
            if let Operator::IntBinary(op) = call.operator {
                if identity_of(op).is_none() {
                    return None;
                }
                let (lhs, rhs) = (call.operands[0], call.operands[1]);
                let lhs_is_call = m.value(lhs).kind.as_instr().map(|i| i.operator == Operator::Call && i.operands[0] == f).unwrap_or(false);
                let rhs_is_call = m.value(rhs).kind.as_instr().map(|i| i.operator == Operator::Call && i.operands[0] == f).unwrap_or(false);
                if lhs_is_call {
                    sites.push(TailSite { block, call: lhs, accumulate: Some(op) });
                    continue;
                }
                if rhs_is_call {
                    sites.push(TailSite { block, call: rhs, accumulate: Some(op) });
                    continue;
                }
            }
        }
        // A return that isn't one of the accepted tail shapes disqualifies
        // conversion: some exit path escapes recursion without looping.
        if m.value(returned).kind.as_instr().map(|i| i.operator == Operator::Call && i.operands[0] == f).unwrap_or(false) {
            continue;
        }
    }
    Some(sites)
}

pub fn run_on_function(m: &mut Module, f: ValueId, no_state: bool) -> bool {
    if !no_state {
        return false;
    }
    let Some(sites) = find_tail_sites(m, f) else { return false };
    if sites.is_empty() {
        return false;
    }
    let accumulate_op = sites.iter().find_map(|s| s.accumulate);
    if sites.iter().any(|s| s.accumulate != accumulate_op) {
        // Mixed accumulate/direct-return shapes aren't handled.
        return false;
    }

    let params = m.function_params(f).to_vec();
    let old_entry = m.function_blocks(f)[0];
    let param_tys: Vec<_> = params.iter().map(|&p| m.type_of(p)).collect();

    let new_entry = m.add_block(f, "tre.entry");
    // Reorder blocks so the new entry comes first.
    let mut order = m.function_blocks(f).to_vec();
    order.retain(|&b| b != new_entry);
    order.insert(0, new_entry);
    m.set_function_blocks(f, order);

    let mut phis = Vec::with_capacity(params.len());
    for (&p, &ty) in params.iter().zip(&param_tys) {
        let phi = m.create_instr(m.fresh_name(), ty, Operator::Phi, smallvec::smallvec![]);
        m.set_block(phi, Some(new_entry), true);
        m.replace_all_uses_with(p, phi);
        phis.push(phi);
    }

    let acc_phi = accumulate_op.map(|op| {
        let result_ty = m.type_of(sites[0].call);
        let ident = identity_of(op).unwrap();
        let identity_const = m.make_const(Const::Int(ident));
        let phi = m.create_instr(m.fresh_name(), result_ty, Operator::Phi, smallvec::smallvec![]);
        m.set_block(phi, Some(new_entry), true);
        (phi, identity_const, op)
    });

    // Entry predecessor: initial params come from old_entry, seeded with
    // the function's own argument values (already captured before RAUW by
    // reusing `params` directly) and the accumulator's identity.
    for (&phi, &arg) in phis.iter().zip(&params) {
        sysy_mir::Builder::new(m).add_incoming(phi, old_entry, arg);
    }
    if let Some((phi, identity_const, _)) = acc_phi {
        sysy_mir::Builder::new(m).add_incoming(phi, old_entry, identity_const);
    }
    {
        let jump = m.create_instr(m.fresh_name(), m.tcx.void, Operator::Jump, smallvec::smallvec![new_entry]);
        m.set_block(jump, Some(old_entry), true);
    }

    for site in &sites {
        let call = m.value(site.call).kind.as_instr().cloned().expect("call");
        let call_args = call.operands[1..].to_vec();
        for (&phi, &arg) in phis.iter().zip(&call_args) {
            sysy_mir::Builder::new(m).add_incoming(phi, site.block, arg);
        }
        if let Some((phi, _, op)) = acc_phi {
            let ret = m.value(site.block).kind.as_block().expect("not a block").terminator().unwrap();
            let ret_data = m.value(ret).kind.as_instr().cloned().unwrap();
            let returned = ret_data.operands[0];
            let binop = m.value(returned).kind.as_instr().cloned().expect("accumulate binop");
            let other = if binop.operands[0] == site.call { binop.operands[1] } else { binop.operands[0] };
            sysy_mir::Builder::new(m).add_incoming(phi, site.block, other);
            let _ = op;
        }

        // Replace the block's `ret` with `jump new_entry`.
        let term = m.value(site.block).kind.as_block().expect("not a block").terminator().unwrap();
        let ty = m.type_of(term);
        m.redefine_instr(term, ty, Operator::Jump, smallvec::smallvec![new_entry]);

        // Drop the now-dead call; DeadInstEliminate clears the accumulate
        // binop and any other now-unreferenced instructions afterward.
        m.clear_operands(site.call);
    }

    true
}

pub struct TailRecursionToLoop;

impl Transform for TailRecursionToLoop {
    fn name(&self) -> &'static str {
        "TailRecursionToLoop"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            let summaries = pm.analysis::<FunctionSummaryAnalysis>(m, f);
            let no_state = summaries.of(f).no_state && summaries.of(f).is_recursive;
            if run_on_function(m, f, no_state) {
                changed = true;
                pm.mark_dirty(f);
                pm.invalidate_summaries();
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
    fn factorial_accumulator_becomes_a_loop() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("fact_iter", &[i32_ty, i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let acc = m.function_params(f)[1];
        let entry = m.add_block(f, "entry");
        let base = m.add_block(f, "base");
        let rec = m.add_block(f, "rec");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(CmpOp::Eq, n, zero);
        b.branch(cond, base, rec);
        b.set_insert_point(base);
        b.ret(Some(acc));
        b.set_insert_point(rec);
        let one = b.module.make_const(Const::Int(1));
        let n1 = b.int_binary(sysy_mir::IntBinOp::Sub, n, one);
        let acc1 = b.int_binary(sysy_mir::IntBinOp::Mul, n, acc);
        let call = b.call(f, &[n1, acc1]);
        b.ret(Some(call));

        assert!(run_on_function(&mut m, f, true));
        let text = sysy_mir::print_module(&m);
        assert!(!text.contains("call"));
    }
}

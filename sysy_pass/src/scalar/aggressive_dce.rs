//! Aggressive DCE (§4.7): seeds a "useful" set with terminators, effectful
//! calls, and stores reachable from pointer-typed arguments, then closes
//! the set under operand reverse-reachability; everything outside the
//! closure is deleted. More aggressive than the single-instruction
//! `DeadInstEliminate` flavor, which only ever removes an instruction with
//! zero remaining users — this flavor can drop a whole chain that still
//! has users, provided none of those users are themselves useful.

use crate::pass::{PassManager, Transform};
use hashbrown::HashSet;
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

fn is_pointer_derived_from_argument(m: &Module, addr: ValueId) -> bool {
    match &m.value(addr).kind {
        sysy_mir::ValueKind::Argument(_) => true,
        sysy_mir::ValueKind::Instr(i) if i.operator == Operator::Gep => is_pointer_derived_from_argument(m, i.operands[0]),
        _ => false,
    }
}

fn seed_useful(m: &Module, function: ValueId) -> Vec<ValueId> {
    let mut useful = Vec::new();
    for &block in m.function_blocks(function) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        for &instr in &blk.instrs {
            let Some(data) = m.value(instr).kind.as_instr() else { continue };
            let is_seed = data.operator.is_terminator()
                || data.operator == Operator::Call
                || (data.operator == Operator::Store && is_pointer_derived_from_argument(m, data.operands[0]));
            if is_seed {
                useful.push(instr);
            }
        }
    }
    useful
}

/// Transitive operand closure of `seeds`, following only instruction
/// operands (constants/globals/arguments/blocks terminate the walk).
fn reverse_reachable(m: &Module, seeds: Vec<ValueId>) -> HashSet<ValueId> {
    let mut closure: HashSet<ValueId> = HashSet::new();
    let mut stack = seeds;
    while let Some(v) = stack.pop() {
        if !closure.insert(v) {
            continue;
        }
        if let Some(data) = m.value(v).kind.as_instr() {
            for &op in &data.operands {
                if matches!(m.value(op).kind, sysy_mir::ValueKind::Instr(_)) {
                    stack.push(op);
                }
            }
        }
    }
    closure
}

pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let seeds = seed_useful(m, function);
    let keep = reverse_reachable(m, seeds);
    let mut changed = false;
    for &block in m.function_blocks(function) {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            if keep.contains(&instr) {
                continue;
            }
            let data = m.value(instr).kind.as_instr().expect("instr");
            if data.operator.is_terminator() || data.operator.is_phi() {
                continue;
            }
            m.clear_operands(instr);
            let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
            blk.instrs.retain(|&i| i != instr);
            changed = true;
        }
    }
    changed
}

pub struct AggressiveDce;

impl Transform for AggressiveDce {
    fn name(&self) -> &'static str {
        "AggressiveDce"
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
    fn pure_chain_with_a_surviving_user_still_gets_dropped() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c1 = b.module.make_const(Const::Int(1));
        let c2 = b.module.make_const(Const::Int(2));
        let add = b.int_binary(sysy_mir::IntBinOp::Add, c1, c2);
        let _mul = b.int_binary(sysy_mir::IntBinOp::Mul, add, c2);
        let ret_val = b.module.make_const(Const::Int(9));
        b.ret(Some(ret_val));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(!text.contains("add"));
        assert!(!text.contains("mul"));
    }
}

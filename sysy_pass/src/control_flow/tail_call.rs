//! Tail-call marking (§4.9): marks a `call` as a tail call when no
//! stack-local memory of the caller is live across it — no load, store, or
//! further call reaches from the call to any `ret` that could still touch
//! an `alloc` belonging to the caller. A DFS over CFG successors from the
//! call's block, pruning as soon as a stack access is seen, decides this;
//! the call itself doesn't need to be the block's last instruction, only
//! followed (on every path to a `ret`) by nothing but the jump/ret glue.
//!
//! The MIR model carries no explicit tail-call flag on `Instr`, so this
//! analysis is exposed as a set the backend consults during lowering
//! rather than as a module mutation.

use crate::cfg::Cfg;
use crate::pass::{CfgAnalysis, PassManager};
use hashbrown::HashSet;
use sysy_mir::{Module, Operator, ValueId};

fn touches_stack(m: &Module, instr: ValueId) -> bool {
    matches!(
        m.value(instr).kind.as_instr().map(|i| &i.operator),
        Some(Operator::Load) | Some(Operator::Store) | Some(Operator::Call) | Some(Operator::Alloc)
    )
}

/// True if every path from `call`'s position to a `ret` touches no further
/// stack memory (load/store/call/alloc) besides `call` itself.
fn call_is_tail(m: &Module, cfg: &Cfg, block: ValueId, call: ValueId) -> bool {
    let instrs = &m.value(block).kind.as_block().expect("not a block").instrs;
    let pos = instrs.iter().position(|&i| i == call).expect("call is in its own block");
    for &after in &instrs[pos + 1..] {
        if after == call {
            continue;
        }
        let is_ret = m.value(after).kind.as_instr().map(|i| i.operator == Operator::Ret).unwrap_or(false);
        if is_ret {
            continue;
        }
        if touches_stack(m, after) {
            return false;
        }
    }

    let mut seen: HashSet<ValueId> = HashSet::new();
    let mut stack: Vec<ValueId> = cfg.successors(block).to_vec();
    while let Some(b) = stack.pop() {
        if !seen.insert(b) {
            continue;
        }
        let blk = m.value(b).kind.as_block().expect("not a block");
        for &i in &blk.instrs {
            if touches_stack(m, i) {
                return false;
            }
        }
        stack.extend(cfg.successors(b).iter().copied());
    }
    true
}

/// The set of `call` instruction ids in `function` eligible for
/// tail-call treatment.
pub fn tail_calls(m: &Module, function: ValueId, pm: &mut PassManager) -> HashSet<ValueId> {
    let cfg = pm.analysis::<CfgAnalysis>(m, function);
    let mut out = HashSet::new();
    for &block in m.function_blocks(function) {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            let is_call = m.value(instr).kind.as_instr().map(|i| i.operator == Operator::Call).unwrap_or(false);
            if is_call && call_is_tail(m, &cfg, block, instr) {
                out.insert(instr);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Module};

    #[test]
    fn call_immediately_before_return_is_tail() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let g = m.add_function("g", &[i32_ty], i32_ty);
        let gentry = m.add_block(g, "entry");
        {
            let mut b = Builder::new(&mut m);
            b.set_insert_point(gentry);
            let p = m.function_params(g)[0];
            b.ret(Some(p));
        }
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let call = b.call(g, &[n]);
        b.ret(Some(call));

        let mut pm = PassManager::new();
        let tails = tail_calls(&m, f, &mut pm);
        assert!(tails.contains(&call));
    }

    #[test]
    fn call_followed_by_a_store_is_not_tail() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let g = m.add_function("g", &[i32_ty], i32_ty);
        let gentry = m.add_block(g, "entry");
        {
            let mut b = Builder::new(&mut m);
            b.set_insert_point(gentry);
            let p = m.function_params(g)[0];
            b.ret(Some(p));
        }
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let slot = b.alloc(i32_ty);
        let call = b.call(g, &[n]);
        b.store(slot, call);
        let v = b.load(slot);
        b.ret(Some(v));

        let mut pm = PassManager::new();
        let tails = tail_calls(&m, f, &mut pm);
        assert!(!tails.contains(&call));
    }
}

//! Inlining (§4.9): substitutes the body of a non-recursive leaf function
//! at each of its call sites, for callers in a non-empty reverse call
//! graph (i.e. the callee is actually called from somewhere). The call's
//! block is split after the call; the callee's blocks are cloned in with
//! arguments replaced by the call's operands, its `ret`s rewritten to
//! `jump` the split-off continuation with a PHI collecting the returned
//! values (skipped for a `void` callee).

use crate::pass::{FunctionSummaryAnalysis, PassManager, Transform};
use hashbrown::HashMap;
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

const MAX_CALLEE_INSTRS: usize = 64;

fn callee_size(m: &Module, f: ValueId) -> usize {
    m.function_blocks(f).iter().map(|&b| m.value(b).kind.as_block().expect("not a block").instrs.len()).sum()
}

/// Clones `callee`'s blocks/instructions into `caller`, rewiring argument
/// references to `args` and returns to `jump continuation` (collecting
/// values into `ret_phi` if present). Returns the cloned entry block.
fn clone_callee_into(
    m: &mut Module,
    callee: ValueId,
    caller: ValueId,
    args: &[ValueId],
    continuation: ValueId,
    ret_phi: Option<ValueId>,
) -> ValueId {
    let params = m.function_params(callee).to_vec();
    let mut value_map: HashMap<ValueId, ValueId> = params.iter().copied().zip(args.iter().copied()).collect();

    let old_blocks = m.function_blocks(callee).to_vec();
    let mut block_map: HashMap<ValueId, ValueId> = HashMap::new();
    for &b in &old_blocks {
        let new_b = m.add_block(caller, format!("{}.inl", m.name_of(b)));
        block_map.insert(b, new_b);
    }

    // First pass: clone every instruction with a placeholder operand list
    // so forward references (phis, branch targets) have a target id.
    let mut instr_map: HashMap<ValueId, ValueId> = HashMap::new();
    for &b in &old_blocks {
        let instrs = m.value(b).kind.as_block().expect("not a block").instrs.clone();
        for &old in &instrs {
            let data = m.value(old).kind.as_instr().expect("instr").clone();
            let ty = m.type_of(old);
            let new_id = m.create_instr(m.fresh_name(), ty, data.operator.clone(), smallvec::smallvec![]);
            instr_map.insert(old, new_id);
        }
    }
    for (&old, &new) in &instr_map {
        value_map.insert(old, new);
    }
    for (&old, &new) in &block_map {
        value_map.insert(old, new);
    }

    let remap = |value_map: &HashMap<ValueId, ValueId>, v: ValueId| -> ValueId { value_map.get(&v).copied().unwrap_or(v) };

    for &b in &old_blocks {
        let instrs = m.value(b).kind.as_block().expect("not a block").instrs.clone();
        let new_b = block_map[&b];
        for &old in &instrs {
            let data = m.value(old).kind.as_instr().expect("instr").clone();
            let new_id = instr_map[&old];
            if data.operator == Operator::Ret {
                let jump = if data.operands.is_empty() {
                    m.redefine_instr(new_id, m.type_of(new_id), Operator::Jump, smallvec::smallvec![continuation]);
                    new_id
                } else {
                    let returned = remap(&value_map, data.operands[0]);
                    if let Some(phi) = ret_phi {
                        sysy_mir::Builder::new(m).add_incoming(phi, new_b, returned);
                    }
                    m.redefine_instr(new_id, m.type_of(new_id), Operator::Jump, smallvec::smallvec![continuation]);
                    new_id
                };
                m.set_block(jump, Some(new_b), true);
                continue;
            }
            let remapped: smallvec::SmallVec<[ValueId; 4]> = data.operands.iter().map(|&v| remap(&value_map, v)).collect();
            m.redefine_instr(new_id, m.type_of(new_id), data.operator.clone(), remapped);
            m.set_block(new_id, Some(new_b), true);
        }
    }

    block_map[&old_blocks[0]]
}

pub fn inline_call(m: &mut Module, caller: ValueId, call_block: ValueId, call: ValueId) -> bool {
    let data = m.value(call).kind.as_instr().expect("instr").clone();
    if data.operator != Operator::Call {
        return false;
    }
    let callee = data.operands[0];
    if callee == caller {
        return false;
    }
    let args = data.operands[1..].to_vec();
    if !m.value(callee).kind.as_function().map(|f| f.is_defined()).unwrap_or(false) {
        return false;
    }

    let block_instrs = m.value(call_block).kind.as_block().expect("not a block").instrs.clone();
    let call_pos = block_instrs.iter().position(|&i| i == call).expect("call is in its block");
    let tail: Vec<ValueId> = block_instrs[call_pos + 1..].to_vec();

    let continuation = m.add_block(caller, "inl.cont");
    let ret_ty = m.value(callee).kind.as_function().unwrap().ret_ty;
    let is_void = m.tcx.is_void(ret_ty);
    let ret_phi = if is_void {
        None
    } else {
        let phi = m.create_instr(m.fresh_name(), ret_ty, Operator::Phi, smallvec::smallvec![]);
        m.set_block(phi, Some(continuation), true);
        Some(phi)
    };

    if let Some(phi) = ret_phi {
        m.replace_all_uses_with(call, phi);
    }
    m.clear_operands(call);
    {
        let blk = m.value_mut(call_block).kind.as_block_mut().expect("not a block");
        blk.instrs.retain(|&i| i != call && !tail.contains(&i));
    }
    for &i in &tail {
        m.set_block(i, Some(continuation), true);
    }

    let cloned_entry = clone_callee_into(m, callee, caller, &args, continuation, ret_phi);

    // Reorder so the cloned blocks and continuation immediately follow
    // `call_block` rather than trailing at the end of the function.
    {
        let jump = m.create_instr(m.fresh_name(), m.tcx.void, Operator::Jump, smallvec::smallvec![cloned_entry]);
        m.set_block(jump, Some(call_block), true);
    }

    true
}

pub struct Inlining;

impl Transform for Inlining {
    fn name(&self) -> &'static str {
        "Inlining"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let summaries = pm.summaries(m);
        let mut changed = false;
        let functions = m.functions.clone();
        for callee in &functions {
            if !m.value(*callee).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            let s = summaries.of(*callee);
            if s.is_recursive || !s.is_leaf {
                continue;
            }
            if callee_size(m, *callee) > MAX_CALLEE_INSTRS {
                continue;
            }
            let callers = summaries.callers(*callee).to_vec();
            if callers.is_empty() {
                continue;
            }
            for caller in callers {
                loop {
                    let mut found = None;
                    'search: for &block in m.function_blocks(caller) {
                        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
                        for &i in &instrs {
                            if let Some(d) = m.value(i).kind.as_instr() {
                                if d.operator == Operator::Call && d.operands[0] == *callee {
                                    found = Some((block, i));
                                    break 'search;
                                }
                            }
                        }
                    }
                    let Some((block, call)) = found else { break };
                    if inline_call(m, caller, block, call) {
                        changed = true;
                        pm.mark_dirty(caller);
                    } else {
                        break;
                    }
                }
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
    fn leaf_function_is_inlined_at_its_call_site() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let g = m.add_function("g", &[i32_ty], i32_ty);
        let gp = m.function_params(g)[0];
        let gentry = m.add_block(g, "entry");
        {
            let mut b = Builder::new(&mut m);
            b.set_insert_point(gentry);
            let one = b.module.make_const(Const::Int(1));
            let r = b.int_binary(sysy_mir::IntBinOp::Add, gp, one);
            b.ret(Some(r));
        }
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let call = b.call(g, &[n]);
        b.ret(Some(call));

        assert!(inline_call(&mut m, f, entry, call));
        let text = sysy_mir::print_module(&m);
        assert!(!text.contains("call"));
        sysy_mir::verify_module(&m).expect("still well-formed");
    }
}

//! Load elimination (§4.8): a dominator-tree walk tracking, per base
//! address, the last value stored or loaded at that address. A load that
//! matches a tracked entry is RAUW'd with the tracked value instead of
//! re-reading memory. Scalars (globals, allocas) are tracked directly by
//! their address `ValueId`; array elements are tracked by `(base, index)`
//! so two `gep`s with the same base and the same constant-or-identical
//! index value hit the same entry.

use crate::cfg::Cfg;
use crate::dominance::DomTree;
use crate::pass::{CfgAnalysis, DominanceAnalysis, FunctionSummaryAnalysis, PassManager, Transform};
use hashbrown::HashMap;
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

#[derive(PartialEq, Eq, Hash, Clone)]
enum Key {
    Scalar(ValueId),
    Indexed(ValueId, Vec<u32>),
}

fn key_for(m: &Module, addr: ValueId) -> Key {
    if let Some(data) = m.value(addr).kind.as_instr() {
        if data.operator == Operator::Gep {
            let base = data.operands[0];
            let idx: Vec<u32> = data.operands[1..].iter().map(|v| v.index() as u32).collect();
            return Key::Indexed(base, idx);
        }
    }
    Key::Scalar(addr)
}

/// Returns the set of globals a call instruction's callee can reach,
/// together with whether that callee has any side effect reaching a
/// pointer argument — used to decide which tracked entries a call
/// invalidates.
fn invalidated_by_call(m: &Module, pm: &mut PassManager, call: ValueId) -> (bool, Vec<ValueId>) {
    let data = m.value(call).kind.as_instr().expect("call instr");
    let callee = data.operands[0];
    let summaries = pm.analysis::<FunctionSummaryAnalysis>(m, callee);
    let s = summaries.of(callee);
    let touches_pointer_args = s.has_side_effect && data.operands[1..].iter().any(|&a| m.tcx.is_pointer(m.type_of(a)));
    let write_globals = if s.memory_write { s.used_globals.iter().copied().collect() } else { Vec::new() };
    (touches_pointer_args || s.memory_write, write_globals)
}

fn eliminate_block(
    m: &mut Module,
    pm: &mut PassManager,
    dom: &DomTree,
    cfg: &Cfg,
    block: ValueId,
    inherited: &HashMap<Key, ValueId>,
    changed: &mut bool,
) {
    // Multi-predecessor blocks start with nothing known, per §4.8.
    let mut local = if cfg.predecessors(block).len() > 1 {
        HashMap::new()
    } else {
        inherited.clone()
    };

    let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
    for instr in instrs {
        let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
        match data.operator {
            Operator::Load => {
                let addr = data.operands[0];
                let key = key_for(m, addr);
                if let Some(&val) = local.get(&key) {
                    m.replace_all_uses_with(instr, val);
                    m.clear_operands(instr);
                    let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                    blk.instrs.retain(|&i| i != instr);
                    *changed = true;
                } else {
                    local.insert(key, instr);
                }
            }
            Operator::Store => {
                let addr = data.operands[0];
                let key = key_for(m, addr);
                local.insert(key, data.operands[1]);
            }
            Operator::Call => {
                let (invalidate_all, globals) = invalidated_by_call(m, pm, instr);
                if invalidate_all {
                    local.retain(|k, _| match k {
                        Key::Scalar(a) => !globals.contains(a),
                        Key::Indexed(base, _) => !globals.contains(base),
                    });
                }
            }
            _ => {}
        }
    }

    let children = dom.children(block).to_vec();
    for child in children {
        eliminate_block(m, pm, dom, cfg, child, &local, changed);
    }
}

pub fn run_on_function(m: &mut Module, function: ValueId, pm: &mut PassManager) -> bool {
    let dom = pm.analysis::<DominanceAnalysis>(m, function);
    let cfg = pm.analysis::<CfgAnalysis>(m, function);
    let entry = m.function_blocks(function)[0];
    let mut changed = false;
    eliminate_block(m, pm, &dom, &cfg, entry, &HashMap::new(), &mut changed);
    changed
}

pub struct LoadEliminate;

impl Transform for LoadEliminate {
    fn name(&self) -> &'static str {
        "LoadEliminate"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if run_on_function(m, f, pm) {
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
    fn load_after_store_to_same_scalar_is_eliminated() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let p = b.alloc(i32_ty);
        let c = b.module.make_const(Const::Int(7));
        b.store(p, c);
        let v = b.load(p);
        b.ret(Some(v));

        let mut pm = PassManager::new();
        assert!(run_on_function(&mut m, f, &mut pm));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 7"));
    }
}

//! Store elimination (§4.8): a per-block walk (no cross-block form)
//! deleting a store that is immediately overwritten by another store to
//! the same address, with no intervening load or call that could observe
//! the first value.

use sysy_mir::{Module, Operator, ValueId};

fn run_on_block(m: &mut Module, block: ValueId) -> bool {
    let mut changed = false;
    // last_store[addr] = the store instruction last seen writing `addr`,
    // still live (no intervening load/call has invalidated it).
    let mut last_store: hashbrown::HashMap<ValueId, ValueId> = hashbrown::HashMap::new();
    let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
    let mut dead = Vec::new();
    for instr in instrs {
        let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
        match data.operator {
            Operator::Store => {
                let addr = data.operands[0];
                if let Some(&prev) = last_store.get(&addr) {
                    dead.push(prev);
                }
                last_store.insert(addr, instr);
            }
            Operator::Load => {
                last_store.remove(&data.operands[0]);
            }
            Operator::Call => {
                last_store.clear();
            }
            _ => {}
        }
    }
    for d in dead {
        m.clear_operands(d);
        let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
        blk.instrs.retain(|&i| i != d);
        changed = true;
    }
    changed
}

pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        if run_on_block(m, block) {
            changed = true;
        }
    }
    changed
}

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;

pub struct StoreEliminate;

impl Transform for StoreEliminate {
    fn name(&self) -> &'static str {
        "StoreEliminate"
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
    fn overwritten_store_with_no_intervening_load_is_removed() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], m.tcx.void);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let p = b.alloc(i32_ty);
        let c1 = b.module.make_const(Const::Int(1));
        let c2 = b.module.make_const(Const::Int(2));
        b.store(p, c1);
        b.store(p, c2);
        b.ret(None);

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert_eq!(text.matches("store").count(), 1);
    }
}

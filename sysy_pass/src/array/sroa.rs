//! SROA (§4.8, scalar replacement of aggregates): splits an `ALLOC` of an
//! array into one independent scalar `ALLOC` per statically-indexed
//! element, provided every user reaches the alloc through a `gep` with
//! constant indices (optionally behind a `bitcast`). Subsequent `mem2reg`
//! then promotes each new scalar alloc to SSA.

use sysy_mir::{Const, Module, Operator, Type, ValueId};

fn const_indices(m: &Module, indices: &[ValueId]) -> Option<Vec<usize>> {
    indices
        .iter()
        .map(|&i| match m.value(i).kind {
            sysy_mir::ValueKind::Const(Const::Int(v)) if v >= 0 => Some(v as usize),
            _ => None,
        })
        .collect()
}

/// Checks every user of `alloc` reaches it only through a `gep` with
/// constant indices (optionally through one `bitcast` first).
fn is_sroa_eligible(m: &Module, alloc: ValueId) -> bool {
    m.users(alloc).iter().all(|&u| {
        let data = m.value(u).kind.as_instr();
        match data.map(|d| &d.operator) {
            Some(Operator::Gep) => const_indices(m, &data.unwrap().operands[1..]).is_some(),
            Some(Operator::Bitcast) => m.users(u).iter().all(|&uu| {
                let dd = m.value(uu).kind.as_instr();
                matches!(dd.map(|d| &d.operator), Some(Operator::Gep))
                    && const_indices(m, &dd.unwrap().operands[1..]).is_some()
            }),
            _ => false,
        }
    })
}

fn flat_offset(dims: &[usize], indices: &[usize]) -> usize {
    let mut offset = 0usize;
    for (i, &idx) in indices.iter().enumerate() {
        let stride: usize = dims[i + 1..].iter().product();
        offset += idx * stride;
    }
    offset
}

fn array_dims(m: &Module, t: Type) -> Vec<usize> {
    match m.tcx.kind(t) {
        sysy_mir::TypeKind::Array { size, element } => {
            let mut d = vec![*size];
            d.extend(array_dims(m, *element));
            d
        }
        _ => Vec::new(),
    }
}

fn run_on_alloc(m: &mut Module, function: ValueId, alloc: ValueId) -> bool {
    let pointee = m.tcx.pointee(m.type_of(alloc)).expect("alloc result is a pointer");
    if !m.tcx.is_array(pointee) {
        return false;
    }
    if !is_sroa_eligible(m, alloc) {
        return false;
    }
    let dims = array_dims(m, pointee);
    let elem_ty = m.tcx.atomic_type(pointee);
    let count: usize = dims.iter().product();

    let entry = m.function_blocks(function)[0];
    let mut scalar_allocs = Vec::with_capacity(count);
    for i in 0..count {
        let name = format!("{}.sroa.{i}", m.name_of(alloc));
        let ptr_ty = m.tcx.pointer(elem_ty);
        let scalar = m.create_instr(name, ptr_ty, Operator::Alloc, smallvec::smallvec![]);
        m.set_block(scalar, Some(entry), false);
        let blk = m.value_mut(entry).kind.as_block_mut().expect("not a block");
        blk.instrs.insert(0, scalar);
        scalar_allocs.push(scalar);
    }

    let users = m.users(alloc).to_vec();
    for u in users {
        let data = m.value(u).kind.as_instr().cloned().expect("checked eligible above");
        match data.operator {
            Operator::Gep => {
                let indices = const_indices(m, &data.operands[1..]).expect("checked eligible above");
                let offset = flat_offset(&dims, &indices);
                m.replace_all_uses_with(u, scalar_allocs[offset]);
                m.clear_operands(u);
                remove_from_parent(m, u);
            }
            Operator::Bitcast => {
                let gep_users = m.users(u).to_vec();
                for g in gep_users {
                    let gdata = m.value(g).kind.as_instr().cloned().unwrap();
                    let indices = const_indices(m, &gdata.operands[1..]).unwrap();
                    let offset = flat_offset(&dims, &indices);
                    m.replace_all_uses_with(g, scalar_allocs[offset]);
                    m.clear_operands(g);
                    remove_from_parent(m, g);
                }
                m.clear_operands(u);
                remove_from_parent(m, u);
            }
            _ => unreachable!("checked eligible above"),
        }
    }
    m.clear_operands(alloc);
    remove_from_parent(m, alloc);
    true
}

fn remove_from_parent(m: &mut Module, instr: ValueId) {
    let parent = m.value(instr).kind.as_instr().and_then(|i| i.parent);
    if let Some(block) = parent {
        let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
        blk.instrs.retain(|&i| i != instr);
    }
}

pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    let allocs: Vec<ValueId> = blocks
        .iter()
        .flat_map(|&b| m.value(b).kind.as_block().expect("not a block").instrs.clone())
        .filter(|&i| matches!(m.value(i).kind.as_instr().map(|d| &d.operator), Some(Operator::Alloc)))
        .collect();
    for alloc in allocs {
        if run_on_alloc(m, function, alloc) {
            changed = true;
        }
    }
    changed
}

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;

pub struct Sroa;

impl Transform for Sroa {
    fn name(&self) -> &'static str {
        "Sroa"
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
    fn splits_a_constant_indexed_array_alloc() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let arr_ty = m.tcx.array(3, i32_ty);
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let arr = b.alloc(arr_ty);
        let elem_ptr_ty = m.tcx.pointer(i32_ty);
        let one = b.module.make_const(Const::Int(1));
        let idx1 = b.gep(arr, &[one], elem_ptr_ty);
        let c = b.module.make_const(Const::Int(42));
        b.store(idx1, c);
        let v = b.load(idx1);
        b.ret(Some(v));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(!text.contains("[3 x i32]"));
    }
}

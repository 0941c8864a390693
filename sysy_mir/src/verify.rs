//! The invariant checker: walks a [`Module`] and confirms the properties
//! every pass must leave intact (§8). Used by the pass manager between
//! pass runs in debug builds, and directly by tests.

use crate::module::Module;
use crate::value::ValueId;
use sysy_common::{CoreError, CoreResult};

/// Checks invariants 1-6 from the testable-properties list for every
/// defined function in `m`. Invariant 7 (dominance of uses by defs) needs
/// the dominance analysis from `sysy_pass` and is out of scope here; this
/// checker only verifies what the MIR graph itself can attest to.
pub fn verify_module(m: &Module) -> CoreResult<()> {
    for &f in &m.functions {
        if m.value(f).kind.as_function().expect("not a function").is_defined() {
            verify_function(m, f)?;
        }
    }
    Ok(())
}

fn verify_function(m: &Module, f: ValueId) -> CoreResult<()> {
    let blocks = m.function_blocks(f);
    if blocks.is_empty() {
        return Err(CoreError::invariant("Function", format!("'{}' has no blocks", m.name_of(f))));
    }

    for &block in blocks {
        verify_block(m, block)?;
    }
    verify_use_def_symmetry(m, f)?;
    Ok(())
}

fn verify_block(m: &Module, block: ValueId) -> CoreResult<()> {
    let blk = m.value(block).kind.as_block().expect("not a block");
    if blk.deleted {
        return Ok(());
    }
    let name = &m.value(block).name;

    if blk.instrs.is_empty() {
        return Err(CoreError::invariant("Block::terminator", format!("block ^{name} is empty")));
    }

    // Exactly one terminator, as the last instruction.
    for (idx, &instr) in blk.instrs.iter().enumerate() {
        let is_term = m
            .value(instr)
            .kind
            .as_instr()
            .expect("block instrs are always instructions")
            .operator
            .is_terminator();
        let is_last = idx + 1 == blk.instrs.len();
        if is_term && !is_last {
            return Err(CoreError::invariant(
                "Block::terminator",
                format!("terminator in ^{name} is not the last instruction"),
            ));
        }
        if is_last && !is_term {
            return Err(CoreError::invariant(
                "Block::terminator",
                format!("block ^{name} does not end in a terminator"),
            ));
        }
    }

    // PHIs form a contiguous prefix.
    let mut seen_non_phi = false;
    for &instr in &blk.instrs {
        let is_phi = m.value(instr).kind.as_instr().expect("instr").operator.is_phi();
        if is_phi && seen_non_phi {
            return Err(CoreError::invariant(
                "Block::phi_prefix",
                format!("PHI in ^{name} follows a non-PHI instruction"),
            ));
        }
        if !is_phi {
            seen_non_phi = true;
        }
    }

    Ok(())
}

/// Invariants 1 and 2: every operand reference is bidirectional.
fn verify_use_def_symmetry(m: &Module, f: ValueId) -> CoreResult<()> {
    for &block in m.function_blocks(f) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        for &instr in &blk.instrs {
            for &operand in m.get_operands(instr) {
                if !m.users(operand).contains(&instr) {
                    return Err(CoreError::invariant(
                        "use-def",
                        format!(
                            "{} is an operand of {} but does not list it as a user",
                            operand, instr
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Testable property 6: after Mem2Reg, no `ALLOC` of a scalar type has any
/// remaining `LOAD`/`STORE` users.
pub fn verify_no_scalar_allocas(m: &Module, f: ValueId) -> CoreResult<()> {
    use crate::instruction::Operator;
    for &block in m.function_blocks(f) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        for &instr in &blk.instrs {
            let data = m.value(instr);
            let is_scalar_alloc = matches!(data.kind.as_instr().map(|i| &i.operator), Some(Operator::Alloc))
                && !m.tcx.is_array(m.tcx.pointee(data.ty).expect("alloc result is a pointer"));
            if is_scalar_alloc && !data.users().is_empty() {
                return Err(CoreError::invariant(
                    "Mem2Reg",
                    format!("scalar alloca {instr} still has {} users after Mem2Reg", data.users().len()),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::instruction::Operator;
    use crate::types::Const;
    use smallvec::SmallVec;

    #[test]
    fn well_formed_function_passes() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c = b.module.make_const(Const::Int(0));
        b.ret(Some(c));
        assert!(verify_module(&m).is_ok());
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let void = m.tcx.void;
        let noop = m.create_instr("", void, Operator::Move, SmallVec::new());
        m.set_block(noop, Some(entry), true);
        assert!(verify_module(&m).is_err());
    }
}

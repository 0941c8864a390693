//! If-chain to switch (§4.9): `if (x==k1) A; else if (x==k2) B; else ... else D;`
//! on one scalar becomes a single `SWITCH`. The chain may contain no side
//! effects besides the equality comparisons themselves; PHIs in the
//! default block are left referencing the chain's final else-block, which
//! becomes the switch's immediate predecessor once the interior
//! comparison blocks are removed.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Const, Module, Operator, ValueId};

struct ChainLink {
    block: ValueId,
    key: i32,
    then_blk: ValueId,
    else_blk: ValueId,
}

/// Walks the `else` edge from `block` collecting `icmp eq x, k` / `branch`
/// links as long as each link's block contains nothing but the comparison
/// and the branch (no other instructions, i.e. no side effects).
fn collect_chain(m: &Module, scrutinee_hint: Option<ValueId>, block: ValueId) -> Option<(ValueId, Vec<ChainLink>, ValueId)> {
    let blk = m.value(block).kind.as_block().expect("not a block");
    let term = blk.terminator()?;
    let br = m.value(term).kind.as_instr()?;
    if br.operator != Operator::Branch {
        return None;
    }
    let (cond, t, f) = (br.operands[0], br.operands[1], br.operands[2]);
    let cmp = m.value(cond).kind.as_instr()?;
    let Operator::Icmp(sysy_mir::CmpOp::Eq) = cmp.operator else { return None };
    let (lhs, rhs) = (cmp.operands[0], cmp.operands[1]);
    let (scrutinee, key_val) = match (
        matches!(m.value(rhs).kind, sysy_mir::ValueKind::Const(Const::Int(_))),
        matches!(m.value(lhs).kind, sysy_mir::ValueKind::Const(Const::Int(_))),
    ) {
        (true, _) => (lhs, rhs),
        (_, true) => (rhs, lhs),
        _ => return None,
    };
    if let Some(expected) = scrutinee_hint {
        if expected != scrutinee {
            return None;
        }
    }
    let key = match m.value(key_val).kind {
        sysy_mir::ValueKind::Const(Const::Int(k)) => k,
        _ => return None,
    };
    // No side effects besides the comparison itself: exactly [cmp, branch].
    if blk.instrs.len() != 2 {
        return None;
    }
    let link = ChainLink { block, key, then_blk: t, else_blk: f };
    match collect_chain(m, Some(scrutinee), f) {
        Some((_, mut rest, default)) => {
            let mut links = vec![link];
            links.append(&mut rest);
            Some((scrutinee, links, default))
        }
        None => Some((scrutinee, vec![link], f)),
    }
}

pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    for &entry in m.function_blocks(function) {
        if m.value(entry).kind.as_block().map(|d| d.deleted).unwrap_or(true) {
            continue;
        }
        let Some((scrutinee, links, default)) = collect_chain(m, None, entry) else { continue };
        if links.len() < 2 {
            continue;
        }

        let cases: Vec<(Const, ValueId)> = links.iter().map(|l| (Const::Int(l.key), l.then_blk)).collect();
        let term = m.value(entry).kind.as_block().expect("not a block").terminator().unwrap();
        let cmp_instr = m.value(term).kind.as_instr().unwrap().operands[0];
        let ty = m.type_of(term);
        let mut operands: smallvec::SmallVec<[ValueId; 4]> = smallvec::smallvec![scrutinee, default];
        for (c, blk) in &cases {
            let kv = m.make_const(*c);
            operands.push(kv);
            operands.push(*blk);
        }
        m.redefine_instr(term, ty, Operator::Switch, operands);
        m.clear_operands(cmp_instr);
        {
            let eblk = m.value_mut(entry).kind.as_block_mut().expect("not a block");
            eblk.instrs.retain(|&i| i != cmp_instr);
        }

        // Delete the interior comparison blocks (all but the entry link).
        for link in &links[1..] {
            let instrs = m.value(link.block).kind.as_block().expect("not a block").instrs.clone();
            for i in instrs {
                m.clear_operands(i);
            }
            m.value_mut(link.block).kind.as_block_mut().expect("not a block").deleted = true;
        }
        changed = true;
    }
    if changed {
        m.sweep_deleted_blocks(function);
    }
    changed
}

pub struct IfChainToSwitch;

impl Transform for IfChainToSwitch {
    fn name(&self) -> &'static str {
        "IfChainToSwitch"
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
    fn three_way_equality_chain_becomes_a_switch() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let x = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let chk2 = m.add_block(f, "chk2");
        let chk3 = m.add_block(f, "chk3");
        let a = m.add_block(f, "a");
        let bb = m.add_block(f, "b");
        let c = m.add_block(f, "c");
        let d = m.add_block(f, "d");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let k1 = b.module.make_const(Const::Int(1));
        let cond1 = b.icmp(sysy_mir::CmpOp::Eq, x, k1);
        b.branch(cond1, a, chk2);
        b.set_insert_point(chk2);
        let k2 = b.module.make_const(Const::Int(2));
        let cond2 = b.icmp(sysy_mir::CmpOp::Eq, x, k2);
        b.branch(cond2, bb, chk3);
        b.set_insert_point(chk3);
        let k3 = b.module.make_const(Const::Int(3));
        let cond3 = b.icmp(sysy_mir::CmpOp::Eq, x, k3);
        b.branch(cond3, c, d);
        b.set_insert_point(a);
        let one = b.module.make_const(Const::Int(10));
        b.ret(Some(one));
        b.set_insert_point(bb);
        let two = b.module.make_const(Const::Int(20));
        b.ret(Some(two));
        b.set_insert_point(c);
        let three = b.module.make_const(Const::Int(30));
        b.ret(Some(three));
        b.set_insert_point(d);
        let four = b.module.make_const(Const::Int(40));
        b.ret(Some(four));

        assert!(run_on_function(&mut m, f));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("switch"));
    }
}

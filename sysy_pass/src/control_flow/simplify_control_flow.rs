//! SimplifyControlFlow (§4.9): six fixpoint rewrites over the CFG —
//! redundant-branch folding, single-predecessor block merging, empty-block
//! bypass, branch hoisting, phi cleanup, and phi-chain block fusion.
//! Unreachable blocks are swept before the fixpoint and again each time
//! around it, since hoisting a branch can strand its old home block.

use crate::cfg::{self, Cfg};
use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{Const, Module, Operator, ValueId};

fn remove_unreachable_blocks(m: &mut Module, function: ValueId, cfg: &Cfg) -> bool {
    let reachable = cfg::reachable_blocks(m, function, cfg);
    let all = m.function_blocks(function).to_vec();
    let mut changed = false;
    for b in all {
        if !reachable.contains(&b) {
            let instrs = m.value(b).kind.as_block().expect("not a block").instrs.clone();
            for i in instrs {
                m.clear_operands(i);
            }
            m.value_mut(b).kind.as_block_mut().expect("not a block").deleted = true;
            changed = true;
        }
    }
    if changed {
        m.sweep_deleted_blocks(function);
    }
    changed
}

/// Step 1: `branch c, X, X -> jump X`; `branch (const), T, F -> jump T/F`.
fn fold_redundant_branches(m: &mut Module, function: ValueId) -> bool {
    let mut changed = false;
    for &block in m.function_blocks(function) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        let Some(term) = blk.terminator() else { continue };
        let Some(data) = m.value(term).kind.as_instr().cloned() else { continue };
        let Operator::Branch = data.operator else { continue };
        let (cond, t, f) = (data.operands[0], data.operands[1], data.operands[2]);
        let target = if t == f {
            Some(t)
        } else {
            match m.value(cond).kind {
                sysy_mir::ValueKind::Const(Const::Bool(b)) => Some(if b { t } else { f }),
                sysy_mir::ValueKind::Const(Const::Int(i)) => Some(if i != 0 { t } else { f }),
                _ => None,
            }
        };
        if let Some(target) = target {
            let ty = m.type_of(term);
            m.redefine_instr(term, ty, Operator::Jump, smallvec::smallvec![target]);
            changed = true;
        }
    }
    changed
}

/// Step 2: if `B -> S` is `B`'s only successor and `B` is `S`'s only
/// predecessor, and `B` ends in `jump S`, splice `S`'s instructions
/// (after resolving its phis to the direct incoming value from `B`) onto
/// the end of `B`, then delete `S`.
fn combine_single_pred_blocks(m: &mut Module, function: ValueId, cfg: &Cfg) -> bool {
    let mut changed = false;
    for &b in m.function_blocks(function) {
        if m.value(b).kind.as_block().map(|d| d.deleted).unwrap_or(true) {
            continue;
        }
        let succs = cfg.successors(b);
        if succs.len() != 1 {
            continue;
        }
        let s = succs[0];
        if s == b || cfg.predecessors(s).len() != 1 {
            continue;
        }
        let blk = m.value(b).kind.as_block().expect("not a block");
        let Some(term) = blk.terminator() else { continue };
        if !matches!(m.value(term).kind.as_instr().map(|i| &i.operator), Some(Operator::Jump)) {
            continue;
        }

        // Resolve S's phis to their single incoming value (from B).
        let s_instrs = m.value(s).kind.as_block().expect("not a block").instrs.clone();
        for &instr in &s_instrs {
            let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
            if data.operator.is_phi() {
                let incoming = data.phi_incoming().find(|&(blk, _)| blk == b).map(|(_, v)| v);
                if let Some(v) = incoming {
                    m.replace_all_uses_with(instr, v);
                    m.clear_operands(instr);
                }
            }
        }

        // Move S's non-phi instructions into B in place of B's jump.
        m.clear_operands(term);
        {
            let bblk = m.value_mut(b).kind.as_block_mut().expect("not a block");
            bblk.instrs.retain(|&i| i != term);
        }
        for i in s_instrs {
            let is_phi = m.value(i).kind.as_instr().map(|d| d.operator.is_phi()).unwrap_or(false);
            if is_phi {
                continue;
            }
            m.set_block(i, Some(b), true);
        }

        m.value_mut(s).kind.as_block_mut().expect("not a block").deleted = true;
        changed = true;
    }
    if changed {
        m.sweep_deleted_blocks(function);
    }
    changed
}

/// Step 3: a block containing only `jump T` is bypassed: every predecessor
/// retargets to `T` directly, and `T`'s phis fan the bypassed block's
/// incoming value out to each of those predecessors.
fn remove_empty_jump_blocks(m: &mut Module, function: ValueId, cfg: &Cfg) -> bool {
    let mut changed = false;
    for &b in m.function_blocks(function) {
        let blk = m.value(b).kind.as_block().expect("not a block");
        if blk.deleted || blk.instrs.len() != 1 {
            continue;
        }
        let only = blk.instrs[0];
        let Some(Operator::Jump) = m.value(only).kind.as_instr().map(|i| i.operator.clone()) else { continue };
        let target = m.value(only).kind.as_instr().unwrap().operands[0];
        if target == b {
            continue;
        }
        let preds = cfg.predecessors(b).to_vec();
        if preds.is_empty() {
            continue;
        }

        // Fan out T's phi entries for `b` to every predecessor of `b`.
        let t_instrs = m.value(target).kind.as_block().expect("not a block").instrs.clone();
        for &instr in &t_instrs {
            let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
            if !data.operator.is_phi() {
                continue;
            }
            if let Some((_, incoming)) = data.phi_incoming().find(|&(blk, _)| blk == b) {
                let ty = m.type_of(instr);
                let mut rebuilt: smallvec::SmallVec<[ValueId; 4]> = data
                    .operands
                    .chunks_exact(2)
                    .filter(|pair| pair[0] != b)
                    .flatten()
                    .copied()
                    .collect();
                for &p in &preds {
                    rebuilt.push(p);
                    rebuilt.push(incoming);
                }
                m.redefine_instr(instr, ty, Operator::Phi, rebuilt);
            }
        }

        for &p in &preds {
            m.modify_successor(p, b, target);
        }
        m.clear_operands(only);
        m.value_mut(b).kind.as_block_mut().expect("not a block").deleted = true;
        changed = true;
    }
    if changed {
        m.sweep_deleted_blocks(function);
    }
    changed
}

/// Step 4: if `T` contains only `branch c, X, Y` and every predecessor of
/// `T` ends in an unconditional `jump T`, rewrite each predecessor to
/// branch directly, skipping `T` (which becomes unreachable and is swept).
fn hoist_branch(m: &mut Module, function: ValueId, cfg: &Cfg) -> bool {
    let mut changed = false;
    for &t in m.function_blocks(function) {
        let blk = m.value(t).kind.as_block().expect("not a block");
        if blk.deleted || blk.instrs.len() != 1 {
            continue;
        }
        let only = blk.instrs[0];
        let Some(data) = m.value(only).kind.as_instr().cloned() else { continue };
        if data.operator != Operator::Branch {
            continue;
        }
        let preds = cfg.predecessors(t).to_vec();
        if preds.is_empty() {
            continue;
        }
        let all_unconditional_jumps = preds.iter().all(|&p| {
            let pblk = m.value(p).kind.as_block().expect("not a block");
            pblk.terminator()
                .and_then(|term| m.value(term).kind.as_instr())
                .map(|i| matches!(i.operator, Operator::Jump))
                .unwrap_or(false)
        });
        if !all_unconditional_jumps {
            continue;
        }
        let cond = data.operands[0];
        let (then_blk, else_blk) = (data.operands[1], data.operands[2]);
        for &p in &preds {
            let term = m
                .value(p)
                .kind
                .as_block()
                .expect("not a block")
                .terminator()
                .expect("checked above");
            let ty = m.type_of(term);
            m.redefine_instr(term, ty, Operator::Branch, smallvec::smallvec![cond, then_blk, else_blk]);
        }
        changed = true;
    }
    changed
}

/// Step 6: a block `b` containing only phis and a trailing `jump t`, where
/// `t` also has phis, can be fused into `t` when `b`'s and `t`'s other
/// predecessor sets are disjoint — `b`'s phis are substituted into `t`'s
/// phi incoming list at the position `b` occupied.
fn merge_phi_chain_blocks(m: &mut Module, function: ValueId, cfg: &Cfg) -> bool {
    let mut changed = false;
    for &b in m.function_blocks(function) {
        let blk = m.value(b).kind.as_block().expect("not a block");
        if blk.deleted {
            continue;
        }
        let instrs = blk.instrs.clone();
        let Some(&last) = instrs.last() else { continue };
        let Some(Operator::Jump) = m.value(last).kind.as_instr().map(|i| i.operator.clone()) else { continue };
        let t = m.value(last).kind.as_instr().unwrap().operands[0];
        if t == b {
            continue;
        }
        let all_phis_but_last = instrs[..instrs.len() - 1]
            .iter()
            .all(|&i| m.value(i).kind.as_instr().map(|d| d.operator.is_phi()).unwrap_or(false));
        if !all_phis_but_last {
            continue;
        }
        let t_has_phis = m
            .value(t)
            .kind
            .as_block()
            .expect("not a block")
            .instrs
            .iter()
            .any(|&i| m.value(i).kind.as_instr().map(|d| d.operator.is_phi()).unwrap_or(false));
        if !t_has_phis {
            continue;
        }
        let b_preds: std::collections::HashSet<ValueId> = cfg.predecessors(b).iter().copied().collect();
        let t_other_preds: std::collections::HashSet<ValueId> =
            cfg.predecessors(t).iter().copied().filter(|&p| p != b).collect();
        if !b_preds.is_disjoint(&t_other_preds) {
            continue;
        }

        // Build a substitution: b's phi ValueId -> its (pred, value) pairs.
        let b_phi_incoming: hashbrown::HashMap<ValueId, Vec<(ValueId, ValueId)>> = instrs[..instrs.len() - 1]
            .iter()
            .map(|&i| (i, m.value(i).kind.as_instr().unwrap().phi_incoming().collect()))
            .collect();

        let t_instrs = m.value(t).kind.as_block().expect("not a block").instrs.clone();
        for &instr in &t_instrs {
            let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
            if !data.operator.is_phi() {
                continue;
            }
            let ty = m.type_of(instr);
            let mut rebuilt: smallvec::SmallVec<[ValueId; 4]> = smallvec::smallvec![];
            for (pred, val) in data.phi_incoming() {
                if pred == b {
                    if let Some(pairs) = b_phi_incoming.get(&val) {
                        for &(bp, bv) in pairs {
                            rebuilt.push(bp);
                            rebuilt.push(bv);
                        }
                    } else {
                        for &bp in &b_preds {
                            rebuilt.push(bp);
                            rebuilt.push(val);
                        }
                    }
                } else {
                    rebuilt.push(pred);
                    rebuilt.push(val);
                }
            }
            m.redefine_instr(instr, ty, Operator::Phi, rebuilt);
        }

        for &p in &b_preds {
            m.modify_successor(p, b, t);
        }
        for &i in &instrs {
            m.clear_operands(i);
        }
        m.value_mut(b).kind.as_block_mut().expect("not a block").deleted = true;
        changed = true;
    }
    if changed {
        m.sweep_deleted_blocks(function);
    }
    changed
}

/// Step 5: drop a phi's incoming values from predecessors no longer in the
/// CFG; if every remaining value is the same, replace the phi with it.
fn cleanup_phis(m: &mut Module, function: ValueId, cfg: &Cfg) -> bool {
    let mut changed = false;
    for &block in m.function_blocks(function) {
        let preds: std::collections::HashSet<ValueId> = cfg.predecessors(block).iter().copied().collect();
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
            if !data.operator.is_phi() {
                continue;
            }
            let kept: Vec<(ValueId, ValueId)> = data.phi_incoming().filter(|(b, _)| preds.contains(b)).collect();
            if kept.len() != data.operands.len() / 2 {
                let ty = m.type_of(instr);
                let ops: smallvec::SmallVec<[ValueId; 4]> = kept.iter().flat_map(|&(b, v)| [b, v]).collect();
                m.redefine_instr(instr, ty, Operator::Phi, ops);
                changed = true;
            }
            let values: Vec<ValueId> = kept.iter().map(|&(_, v)| v).collect();
            if let Some(&first) = values.first() {
                if values.iter().all(|&v| v == first) && first != instr {
                    m.replace_all_uses_with(instr, first);
                    m.clear_operands(instr);
                    let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                    blk.instrs.retain(|&i| i != instr);
                    changed = true;
                }
            }
        }
    }
    changed
}

/// Runs the fixpoint per §4.9: unreachable-block removal first, then the
/// six rewrites repeated until none fires.
pub fn run_on_function(m: &mut Module, function: ValueId) -> bool {
    let mut changed_any = false;
    let cfg0 = cfg::build(m, function);
    changed_any |= remove_unreachable_blocks(m, function, &cfg0);
    loop {
        let mut changed = false;
        changed |= fold_redundant_branches(m, function);
        let cfg = cfg::build(m, function);
        changed |= combine_single_pred_blocks(m, function, &cfg);
        let cfg = cfg::build(m, function);
        changed |= remove_empty_jump_blocks(m, function, &cfg);
        let cfg = cfg::build(m, function);
        changed |= hoist_branch(m, function, &cfg);
        let cfg = cfg::build(m, function);
        changed |= remove_unreachable_blocks(m, function, &cfg);
        let cfg = cfg::build(m, function);
        changed |= cleanup_phis(m, function, &cfg);
        let cfg = cfg::build(m, function);
        changed |= merge_phi_chain_blocks(m, function, &cfg);
        changed_any |= changed;
        if !changed {
            break;
        }
    }
    changed_any
}

pub struct SimplifyControlFlow;

impl Transform for SimplifyControlFlow {
    fn name(&self) -> &'static str {
        "SimplifyControlFlow"
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
    fn branch_on_constant_becomes_a_jump() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let else_blk = m.add_block(f, "else");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let t = b.module.make_const(Const::Bool(true));
        b.branch(t, then_blk, else_blk);
        b.set_insert_point(then_blk);
        let one = b.module.make_const(Const::Int(1));
        b.ret(Some(one));
        b.set_insert_point(else_blk);
        let two = b.module.make_const(Const::Int(2));
        b.ret(Some(two));

        assert!(run_on_function(&mut m, f));
        sysy_mir::verify_module(&m).expect("still well-formed");
    }

    #[test]
    fn empty_jump_only_block_is_bypassed() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mid = m.add_block(f, "mid");
        let end = m.add_block(f, "end");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        b.jump(mid);
        b.set_insert_point(mid);
        b.jump(end);
        b.set_insert_point(end);
        let c = b.module.make_const(Const::Int(1));
        b.ret(Some(c));

        assert!(run_on_function(&mut m, f));
        sysy_mir::verify_module(&m).expect("still well-formed");
    }
}

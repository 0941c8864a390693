//! PHI removal (§4.11): for every PHI in block `B`, for every predecessor
//! `p`, append a `Move` at the end of `p` writing the incoming value into
//! the PHI's own storage slot. `Move`'s operand layout (`[dest, src]`)
//! names `dest` *by reference* rather than by defining it — unlike every
//! other operator, a `Move`'s own result carries no meaning, so several
//! `Move`s across different predecessors can all target the same PHI
//! ValueId without violating the one-definition-per-value rule the rest of
//! the MIR relies on. The PHI instruction itself is left in place as an
//! inert storage declaration; lowering skips over it instead of deleting it
//! (`lower.rs` allocates it a register and emits nothing for it).
//!
//! The set of moves appended to one predecessor is a parallel copy — all
//! must read their sources as of block entry, not after an earlier move in
//! the same batch has run — so a naive sequential lowering can clobber a
//! source some other pending move still needs. Resolved per §4.11:
//! 1. Schedule a move whose destination is not the source of any other
//!    still-pending move; repeat until only cycles remain.
//! 2. Break one cycle with `temp ← dest`, rewrite every pending move whose
//!    source was `dest` to read `temp` instead, and continue.

use hashbrown::HashMap;
use smallvec::smallvec;
use sysy_mir::{Module, Operator, Type, ValueId};

/// Orders one predecessor's parallel-copy set into a sequence of plain
/// `(dest, src)` moves, inserting an unattached scratch slot to break each
/// cycle found along the way.
fn schedule_parallel_copy(m: &mut Module, moves: Vec<(ValueId, ValueId)>, scratch_ty: Type) -> Vec<(ValueId, ValueId)> {
    let mut pending: Vec<(ValueId, ValueId)> = moves.into_iter().filter(|&(d, s)| d != s).collect();
    let mut ordered = Vec::new();

    while !pending.is_empty() {
        let safe = pending.iter().position(|&(dest, _)| !pending.iter().any(|&(_, s)| s == dest));
        if let Some(i) = safe {
            ordered.push(pending.remove(i));
            continue;
        }
        // Only cycles remain. Save the first pending move's about-to-be
        // overwritten destination into a fresh scratch slot, then redirect
        // every move that was waiting to read it.
        let (cycle_dest, _) = pending[0];
        let temp = m.create_instr(m.fresh_name(), scratch_ty, Operator::Phi, smallvec![]);
        ordered.push((temp, cycle_dest));
        for (_, src) in pending.iter_mut() {
            if *src == cycle_dest {
                *src = temp;
            }
        }
    }
    ordered
}

/// Inserts the resolved PHI-elimination moves for every PHI in `function`'s
/// blocks. PHIs themselves are left untouched in place.
pub fn insert_phi_moves(m: &mut Module, function: ValueId) {
    let blocks = m.function_blocks(function).to_vec();
    let mut by_pred: HashMap<ValueId, Vec<(ValueId, ValueId)>> = HashMap::new();

    for &block in &blocks {
        for &phi in &m.get_phis(block) {
            let incoming: Vec<(ValueId, ValueId)> = m.value(phi).kind.as_instr().expect("phi is an instr").phi_incoming().collect();
            for (pred, value) in incoming {
                by_pred.entry(pred).or_default().push((phi, value));
            }
        }
    }

    for (pred, moves) in by_pred {
        let scratch_ty = m.type_of(moves[0].0);
        let ordered = schedule_parallel_copy(m, moves, scratch_ty);
        let term = m
            .value(pred)
            .kind
            .as_block()
            .expect("not a block")
            .terminator()
            .expect("every block has a terminator before phi removal runs");
        for (dest, src) in ordered {
            let mv = m.create_instr(m.fresh_name(), m.tcx.void, Operator::Move, smallvec![dest, src]);
            m.set_block(mv, Some(pred), false);
            let blk = m.value_mut(pred).kind.as_block_mut().expect("not a block");
            let pos = blk.instrs.iter().position(|&i| i == term).expect("terminator is in its own block");
            blk.instrs.insert(pos, mv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, CmpOp, Const, Module};

    #[test]
    fn diamond_phi_gets_a_move_in_both_predecessors() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let else_blk = m.add_block(f, "else");
        let join = m.add_block(f, "join");

        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(CmpOp::Gt, n, zero);
        b.branch(cond, then_blk, else_blk);
        b.set_insert_point(then_blk);
        let one = b.module.make_const(Const::Int(1));
        b.jump(join);
        b.set_insert_point(else_blk);
        let two = b.module.make_const(Const::Int(2));
        b.jump(join);
        b.set_insert_point(join);
        let phi = b.phi(i32_ty);
        b.ret(Some(phi));
        b.add_incoming(phi, then_blk, one);
        b.add_incoming(phi, else_blk, two);

        insert_phi_moves(&mut m, f);
        assert_eq!(m.get_phis(join), vec![phi]);
        let is_move_to_phi = |blk: ValueId| -> bool {
            m.value(blk).kind.as_block().unwrap().instrs.iter().any(|&i| {
                matches!(m.value(i).kind.as_instr(), Some(d) if d.operator == Operator::Move && d.operands[0] == phi)
            })
        };
        assert!(is_move_to_phi(then_blk));
        assert!(is_move_to_phi(else_blk));
    }

    #[test]
    fn swap_pattern_across_two_phis_breaks_its_cycle() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty, i32_ty], i32_ty);
        let a0 = m.function_params(f)[0];
        let b0 = m.function_params(f)[1];
        let entry = m.add_block(f, "entry");
        let loop_blk = m.add_block(f, "loop");

        let mut bd = Builder::new(&mut m);
        bd.set_insert_point(entry);
        bd.jump(loop_blk);
        bd.set_insert_point(loop_blk);
        let phi_a = bd.phi(i32_ty);
        let phi_b = bd.phi(i32_ty);
        // Swap on the back edge: each iteration feeds phi_a <- phi_b and
        // phi_b <- phi_a, an unbreakable-without-a-temp cycle.
        bd.add_incoming(phi_a, entry, a0);
        bd.add_incoming(phi_a, loop_blk, phi_b);
        bd.add_incoming(phi_b, entry, b0);
        bd.add_incoming(phi_b, loop_blk, phi_a);
        bd.jump(loop_blk);

        insert_phi_moves(&mut m, f);
        let moves_in_loop: Vec<_> = m
            .value(loop_blk)
            .kind
            .as_block()
            .unwrap()
            .instrs
            .iter()
            .filter(|&&i| matches!(m.value(i).kind.as_instr(), Some(d) if d.operator == Operator::Move))
            .count();
        // Two logical writes plus one scratch save to break the cycle.
        assert_eq!(moves_in_loop, 3);
    }
}

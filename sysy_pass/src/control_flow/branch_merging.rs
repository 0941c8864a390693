//! Branch merging (§4.9): recognizes `if (x < y) A else B` where both arms
//! jump to the same join block and the join's PHI selects between the two
//! compared operands — i.e. the PHI computes `x < y ? x : y` or its
//! flipped/negated forms — and replaces the PHI with a direct `SMIN`/`SMAX`
//! value, deleting the now-redundant branch and its arms when they do
//! nothing else.

use crate::pass::{PassManager, Transform};
use sysy_common::CoreResult;
use sysy_mir::{CmpOp, IntBinOp, Module, Operator, ValueId};

/// For `branch (icmp op, x, y), t, f`, decides whether the join PHI's
/// `(t-value, f-value)` pair matches `(x, y)` (in either order) closely
/// enough to fold into `smin`/`smax`, and if so which.
fn min_max_for(op: CmpOp, t_val: ValueId, f_val: ValueId, x: ValueId, y: ValueId) -> Option<IntBinOp> {
    let (lt_like, picks_x_when_true) = match op {
        CmpOp::Lt | CmpOp::Le => (true, true),
        CmpOp::Gt | CmpOp::Ge => (false, true),
        _ => return None,
    };
    let matches_xy = t_val == x && f_val == y;
    let matches_yx = t_val == y && f_val == x;
    if !matches_xy && !matches_yx {
        return None;
    }
    // `t_val == x` means the PHI picks x when the condition (x </> y) held.
    let picks_x_on_true = matches_xy;
    let effectively_picks_smaller_on_true = if lt_like { picks_x_when_true } else { !picks_x_when_true };
    let wants_min = picks_x_on_true == effectively_picks_smaller_on_true;
    Some(if wants_min { IntBinOp::Smin } else { IntBinOp::Smax })
}

pub fn run_on_function(m: &mut Module, function: ValueId, cfg: &crate::cfg::Cfg) -> bool {
    let mut changed = false;
    for &block in m.function_blocks(function) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        let Some(term) = blk.terminator() else { continue };
        let Some(br) = m.value(term).kind.as_instr().cloned() else { continue };
        if br.operator != Operator::Branch {
            continue;
        }
        let (cond, t, f) = (br.operands[0], br.operands[1], br.operands[2]);
        let Some(cmp) = m.value(cond).kind.as_instr().cloned() else { continue };
        let Operator::Icmp(op) = cmp.operator else { continue };
        let (x, y) = (cmp.operands[0], cmp.operands[1]);

        // t and f must each be "only jump to the same join", with no other
        // side effects (plain empty blocks), or be the join directly.
        let resolve = |b: ValueId| -> Option<ValueId> {
            let d = m.value(b).kind.as_block().expect("not a block");
            if d.instrs.len() == 1 {
                let only = d.instrs[0];
                if let Some(Operator::Jump) = m.value(only).kind.as_instr().map(|i| i.operator.clone()) {
                    return Some(m.value(only).kind.as_instr().unwrap().operands[0]);
                }
            }
            None
        };
        let Some(join_t) = resolve(t) else { continue };
        let Some(join_f) = resolve(f) else { continue };
        if join_t != join_f {
            continue;
        }
        let join = join_t;
        if cfg.predecessors(join).len() != 2 {
            continue;
        }

        let join_instrs = m.value(join).kind.as_block().expect("not a block").instrs.clone();
        for instr in join_instrs {
            let Some(data) = m.value(instr).kind.as_instr().cloned() else { continue };
            if !data.operator.is_phi() {
                continue;
            }
            let incoming: Vec<(ValueId, ValueId)> = data.phi_incoming().collect();
            let t_val = incoming.iter().find(|&&(b, _)| b == t).map(|&(_, v)| v);
            let f_val = incoming.iter().find(|&&(b, _)| b == f).map(|&(_, v)| v);
            let (Some(t_val), Some(f_val)) = (t_val, f_val) else { continue };
            let Some(minmax) = min_max_for(op, t_val, f_val, x, y) else { continue };

            let ty = m.type_of(instr);
            let replacement = m.create_instr(m.fresh_name(), ty, Operator::IntBinary(minmax), smallvec::smallvec![x, y]);
            m.set_block(replacement, Some(block), false);
            {
                let bblk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                let pos = bblk.instrs.iter().position(|&i| i == term).unwrap();
                bblk.instrs.insert(pos, replacement);
            }
            m.replace_all_uses_with(instr, replacement);
            m.clear_operands(instr);
            let jblk = m.value_mut(join).kind.as_block_mut().expect("not a block");
            jblk.instrs.retain(|&i| i != instr);
            changed = true;
        }
    }
    changed
}

pub struct BranchMerging;

impl Transform for BranchMerging {
    fn name(&self) -> &'static str {
        "BranchMerging"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            let cfg = crate::cfg::build(m, f);
            if run_on_function(m, f, &cfg) {
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
    fn diamond_min_pattern_becomes_smin() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty, i32_ty], i32_ty);
        let x = m.function_params(f)[0];
        let y = m.function_params(f)[1];
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let else_blk = m.add_block(f, "else");
        let join = m.add_block(f, "join");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let cond = b.icmp(CmpOp::Lt, x, y);
        b.branch(cond, then_blk, else_blk);
        b.set_insert_point(then_blk);
        b.jump(join);
        b.set_insert_point(else_blk);
        b.jump(join);
        b.set_insert_point(join);
        let phi = b.phi(i32_ty);
        b.ret(Some(phi));
        b.add_incoming(phi, then_blk, x);
        b.add_incoming(phi, else_blk, y);

        let cfg = crate::cfg::build(&m, f);
        assert!(run_on_function(&mut m, f, &cfg));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("smin"));
    }
}

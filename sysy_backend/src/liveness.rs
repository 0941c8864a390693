//! Live-variable analysis over Backend MIR (§4.11): the same backward
//! dataflow-to-fixpoint idiom `sysy_pass::mem2reg` uses for its own
//! per-block liveness, applied to Backend MIR's label-addressed blocks
//! instead of MIR's `ValueId`-addressed ones. Produces, per block,
//! live-in/live-out register sets; from those, `classify_storage` derives
//! `lir::Storage` and `compute_intervals` derives the per-register live
//! ranges `regalloc.rs`'s linear scan consumes.

use crate::lir::{LFunction, LInstr, Storage, VReg};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct BlockLiveness {
    pub live_in: HashSet<VReg>,
    pub live_out: HashSet<VReg>,
}

fn successor_labels(instrs: &[LInstr]) -> Vec<&str> {
    match instrs.last() {
        Some(LInstr::Jump { target }) => vec![target.as_str()],
        Some(LInstr::Branch { then_label, else_label, .. }) => vec![then_label.as_str(), else_label.as_str()],
        _ => Vec::new(),
    }
}

/// Per-block live-in/live-out sets, indexed by position in `lf.blocks`.
pub fn analyze(lf: &LFunction) -> Vec<BlockLiveness> {
    let label_index: HashMap<&str, usize> = lf.blocks.iter().enumerate().map(|(i, b)| (b.label.as_str(), i)).collect();
    let succs: Vec<Vec<usize>> =
        lf.blocks.iter().map(|b| successor_labels(&b.instrs).iter().map(|l| label_index[l]).collect()).collect();

    let mut live_in: Vec<HashSet<VReg>> = vec![HashSet::new(); lf.blocks.len()];
    let mut live_out: Vec<HashSet<VReg>> = vec![HashSet::new(); lf.blocks.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..lf.blocks.len()).rev() {
            let mut out: HashSet<VReg> = HashSet::new();
            for &s in &succs[i] {
                out.extend(live_in[s].iter().copied());
            }
            let mut inn = out.clone();
            for instr in lf.blocks[i].instrs.iter().rev() {
                if let Some(d) = instr.def() {
                    inn.remove(&d);
                }
                for u in instr.uses() {
                    inn.insert(u);
                }
            }
            if inn != live_in[i] || out != live_out[i] {
                changed = true;
            }
            live_in[i] = inn;
            live_out[i] = out;
        }
    }
    live_in.into_iter().zip(live_out).map(|(i, o)| BlockLiveness { live_in: i, live_out: o }).collect()
}

/// Classifies every register (and writes the result into
/// `lf.param_storage`/`lf.vreg_storage`): `Function`-scope if it crosses a
/// block boundary or is live across a `Call` within one block, `Local`
/// otherwise.
pub fn classify_storage(lf: &mut LFunction, liveness: &[BlockLiveness]) {
    let mut function_scope: HashSet<VReg> = HashSet::new();
    for bl in liveness {
        function_scope.extend(bl.live_in.iter().copied());
        function_scope.extend(bl.live_out.iter().copied());
    }
    for (bi, block) in lf.blocks.iter().enumerate() {
        let mut inn: HashSet<VReg> = liveness[bi].live_out.clone();
        for instr in block.instrs.iter().rev() {
            if matches!(instr, LInstr::Call { .. }) {
                function_scope.extend(inn.iter().copied());
            }
            if let Some(d) = instr.def() {
                inn.remove(&d);
            }
            for u in instr.uses() {
                inn.insert(u);
            }
        }
    }
    let classify = |v: VReg| if function_scope.contains(&v) { Storage::Function } else { Storage::Local };
    lf.param_storage = lf.params.iter().map(|&p| classify(p)).collect();
    lf.vreg_storage = (0..lf.vreg_count).map(|n| (VReg(n), classify(VReg(n)))).collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

/// One global position per instruction, in `lf.blocks` order, gives each
/// register a `[start, end]` live range for linear-scan allocation.
/// Parameters start at position `0` even when first used later.
pub fn compute_intervals(lf: &LFunction) -> HashMap<VReg, Interval> {
    let mut intervals: HashMap<VReg, Interval> = HashMap::new();
    for &p in &lf.params {
        intervals.insert(p, Interval { start: 0, end: 0 });
    }
    let mut pos = 0usize;
    for block in &lf.blocks {
        for instr in &block.instrs {
            if let Some(d) = instr.def() {
                intervals.entry(d).or_insert(Interval { start: pos, end: pos });
            }
            for u in instr.uses() {
                let iv = intervals.entry(u).or_insert(Interval { start: pos, end: pos });
                iv.end = iv.end.max(pos);
            }
            pos += 1;
        }
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{Cond, LBlock};

    fn simple_branching_function() -> LFunction {
        let mut lf = LFunction::new("f");
        let p = lf.fresh_vreg();
        lf.params.push(p);
        let cmp = lf.fresh_vreg();
        lf.blocks.push(LBlock {
            label: "entry".into(),
            instrs: vec![
                LInstr::Cmp { cond: Cond::Gt, dst: cmp, lhs: p, rhs: p },
                LInstr::Branch { cond: cmp, then_label: "then".into(), else_label: "else".into() },
            ],
        });
        lf.blocks.push(LBlock { label: "then".into(), instrs: vec![LInstr::Ret { value: Some(p) }] });
        lf.blocks.push(LBlock { label: "else".into(), instrs: vec![LInstr::Ret { value: Some(p) }] });
        lf
    }

    #[test]
    fn param_live_into_both_successors_is_function_scoped() {
        let mut lf = simple_branching_function();
        let liveness = analyze(&lf);
        assert!(liveness[0].live_out.contains(&lf.params[0]));
        classify_storage(&mut lf, &liveness);
        assert_eq!(lf.param_storage[0], Storage::Function);
    }

    #[test]
    fn value_live_across_a_call_is_function_scoped() {
        let mut lf = LFunction::new("f");
        let v = lf.fresh_vreg();
        let ret = lf.fresh_vreg();
        lf.blocks.push(LBlock {
            label: "entry".into(),
            instrs: vec![
                LInstr::LoadImm { dst: v, value: 7 },
                LInstr::Call { callee: "g".into(), args: vec![], ret: Some(ret) },
                LInstr::Ret { value: Some(v) },
            ],
        });
        let liveness = analyze(&lf);
        classify_storage(&mut lf, &liveness);
        assert_eq!(lf.vreg_storage[&v], Storage::Function);
    }

    #[test]
    fn value_dead_before_a_call_stays_local() {
        let mut lf = LFunction::new("f");
        let v = lf.fresh_vreg();
        let w = lf.fresh_vreg();
        let ret = lf.fresh_vreg();
        lf.blocks.push(LBlock {
            label: "entry".into(),
            instrs: vec![
                LInstr::LoadImm { dst: v, value: 7 },
                LInstr::Move { dst: w, src: v },
                LInstr::Call { callee: "g".into(), args: vec![], ret: Some(ret) },
                LInstr::Ret { value: Some(ret) },
            ],
        });
        let liveness = analyze(&lf);
        classify_storage(&mut lf, &liveness);
        assert_eq!(lf.vreg_storage[&v], Storage::Local);
    }

    #[test]
    fn intervals_span_def_to_last_use() {
        let lf = simple_branching_function();
        let intervals = compute_intervals(&lf);
        let p = lf.params[0];
        assert_eq!(intervals[&p].start, 0);
        assert!(intervals[&p].end >= 2);
    }
}

//! Block positioning (§4.9): lays blocks out in the order the backend will
//! emit them, reverse-post-order from the entry, preferring the
//! higher-probability successor first when a block has a branch — this
//! keeps the hot path fall-through and pushes cold paths (exception edges,
//! rare branches) out of line. Purely a reordering of `Module`'s per-function
//! block list; no instruction is created, moved between blocks, or deleted.

use crate::control_flow::branch_probability::BranchProbabilityAnalysis;
use crate::pass::{CfgAnalysis, PassManager, Transform};
use hashbrown::HashSet;
use sysy_common::CoreResult;
use sysy_mir::{Module, ValueId};

fn positioned_order(m: &Module, function: ValueId, pm: &mut PassManager) -> Vec<ValueId> {
    let cfg = pm.analysis::<CfgAnalysis>(m, function);
    let probs = pm.analysis::<BranchProbabilityAnalysis>(m, function);
    let blocks = m.function_blocks(function).to_vec();
    let Some(&entry) = blocks.first() else { return blocks };

    let mut order = Vec::with_capacity(blocks.len());
    let mut visited: HashSet<ValueId> = HashSet::new();
    let mut stack = vec![entry];
    while let Some(b) = stack.pop() {
        if !visited.insert(b) {
            continue;
        }
        order.push(b);
        let mut succs = cfg.successors(b).to_vec();
        succs.sort_by(|&a, &c| probs.probability(b, a).partial_cmp(&probs.probability(b, c)).unwrap());
        // Push lowest-probability first so it pops last, i.e. the
        // highest-probability successor is visited (and positioned)
        // immediately after `b`.
        for &s in &succs {
            if !visited.contains(&s) {
                stack.push(s);
            }
        }
    }
    for &b in &blocks {
        if !visited.contains(&b) {
            order.push(b);
            visited.insert(b);
        }
    }
    order
}

pub fn run_on_function(m: &mut Module, function: ValueId, pm: &mut PassManager) -> bool {
    let order = positioned_order(m, function, pm);
    let current = m.function_blocks(function).to_vec();
    if order == current {
        return false;
    }
    m.set_function_blocks(function, order);
    true
}

pub struct BlockPositioning;

impl Transform for BlockPositioning {
    fn name(&self) -> &'static str {
        "BlockPositioning"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if run_on_function(m, f, pm) {
                changed = true;
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
    fn hot_successor_is_positioned_immediately_after() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let header = m.add_block(f, "header");
        let body = m.add_block(f, "body");
        let exit = m.add_block(f, "exit");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        b.jump(header);
        b.set_insert_point(header);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(sysy_mir::CmpOp::Gt, n, zero);
        b.branch(cond, body, exit);
        b.set_insert_point(body);
        b.jump(header);
        b.set_insert_point(exit);
        b.ret(Some(n));

        let mut pm = PassManager::new();
        assert!(run_on_function(&mut m, f, &mut pm));
        let order = m.function_blocks(f).to_vec();
        let header_idx = order.iter().position(|&b| b == header).unwrap();
        let body_idx = order.iter().position(|&b| b == body).unwrap();
        assert_eq!(body_idx, header_idx + 1);
    }
}

//! Mem2Reg (§4.6): promotes scalar `ALLOC`s whose only users are matching
//! `LOAD`/`STORE` into SSA values via pruned phi placement at the iterated
//! dominance frontier, followed by a dominator-tree-DFS rename pass.

use crate::dominance::DomTree;
use crate::pass::{DominanceAnalysis, PassManager, Transform};
use hashbrown::{HashMap, HashSet};
use smallvec::smallvec;
use sysy_common::CoreResult;
use sysy_mir::{Module, Operator, ValueId};

fn is_promotable_alloc(m: &Module, alloc: ValueId) -> bool {
    let data = m.value(alloc);
    let Some(instr) = data.kind.as_instr() else { return false };
    if !matches!(instr.operator, Operator::Alloc) {
        return false;
    }
    let pointee = m.tcx.pointee(data.ty).expect("alloc result is a pointer");
    if m.tcx.is_array(pointee) {
        return false;
    }
    m.users(alloc).iter().all(|&u| {
        let ui = m.value(u).kind.as_instr();
        match ui.map(|i| &i.operator) {
            Some(Operator::Load) => true,
            Some(Operator::Store) => ui.unwrap().operands[0] == alloc,
            _ => false,
        }
    })
}

fn defining_blocks(m: &Module, alloc: ValueId) -> HashSet<ValueId> {
    m.users(alloc)
        .iter()
        .copied()
        .filter(|&u| matches!(m.value(u).kind.as_instr().map(|i| &i.operator), Some(Operator::Store)) && m.get_operands(u)[0] == alloc)
        .map(|u| m.value(u).kind.as_instr().unwrap().parent.expect("instr has a parent"))
        .collect()
}

/// Per-block liveness of one alloca: a block "uses" it if it loads before
/// any store to it; a block "defs" it if it stores to it at all — used to
/// prune phi placement to blocks where the variable is actually live-in.
fn live_in_blocks(m: &Module, alloc: ValueId, blocks: &[ValueId], cfg: &crate::cfg::Cfg) -> HashSet<ValueId> {
    let mut uses = HashSet::new();
    let mut defs = HashSet::new();
    for &b in blocks {
        let blk = m.value(b).kind.as_block().expect("not a block");
        let mut stored_yet = false;
        for &instr in &blk.instrs {
            let Some(i) = m.value(instr).kind.as_instr() else { continue };
            match &i.operator {
                Operator::Load if i.operands[0] == alloc => {
                    if !stored_yet {
                        uses.insert(b);
                    }
                }
                Operator::Store if i.operands[0] == alloc => {
                    stored_yet = true;
                    defs.insert(b);
                }
                _ => {}
            }
        }
    }

    let mut live_in: HashMap<ValueId, bool> = blocks.iter().map(|&b| (b, false)).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for &b in blocks {
            let live_out = cfg.successors(b).iter().any(|s| *live_in.get(s).unwrap_or(&false));
            let new_live_in = uses.contains(&b) || (live_out && !defs.contains(&b));
            if new_live_in != *live_in.get(&b).unwrap_or(&false) {
                live_in.insert(b, new_live_in);
                changed = true;
            }
        }
    }
    live_in.into_iter().filter(|&(_, v)| v).map(|(b, _)| b).collect()
}

fn iterated_dominance_frontier(dom: &DomTree, def_blocks: &HashSet<ValueId>) -> HashSet<ValueId> {
    let mut idf = HashSet::new();
    let mut worklist: Vec<ValueId> = def_blocks.iter().copied().collect();
    let mut in_def = def_blocks.clone();
    while let Some(b) = worklist.pop() {
        for &f in dom.frontier(b) {
            if idf.insert(f) && in_def.insert(f) {
                worklist.push(f);
            }
        }
    }
    idf
}

/// Promotes every eligible scalar alloca in `function`. Returns whether any
/// promotion happened.
pub fn run_on_function(m: &mut Module, function: ValueId, pm: &mut PassManager) -> bool {
    let blocks = m.function_blocks(function).to_vec();
    let allocs: Vec<ValueId> = blocks
        .iter()
        .flat_map(|&b| m.value(b).kind.as_block().expect("not a block").instrs.clone())
        .filter(|&i| is_promotable_alloc(m, i))
        .collect();
    if allocs.is_empty() {
        return false;
    }

    let cfg = pm.analysis::<crate::pass::CfgAnalysis>(m, function);
    let dom = pm.analysis::<DominanceAnalysis>(m, function);

    // phis[block][alloc] = phi ValueId, created on demand.
    let mut phis: HashMap<(ValueId, ValueId), ValueId> = HashMap::new();

    for &alloc in &allocs {
        let def_blocks = defining_blocks(m, alloc);
        let live_in = live_in_blocks(m, alloc, &blocks, &cfg);
        let idf = iterated_dominance_frontier(&dom, &def_blocks);
        let pointee = m.tcx.pointee(m.type_of(alloc)).expect("alloc is a pointer");
        for &block in idf.intersection(&live_in) {
            let phi = m.create_instr(m.fresh_name(), pointee, Operator::Phi, smallvec![]);
            let first_non_phi = {
                let instrs = &m.value(block).kind.as_block().expect("not a block").instrs;
                instrs.iter().position(|&i| !m.value(i).kind.as_instr().expect("instr").operator.is_phi()).unwrap_or(instrs.len())
            };
            m.value_mut(phi).kind.as_instr_mut().unwrap().parent = Some(block);
            let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
            blk.instrs.insert(first_non_phi, phi);
            phis.insert((block, alloc), phi);
        }
    }

    // DFS rename: a stack of current definitions per alloc, seeded with an
    // undef placeholder (the MIR assumes well-typed input so an unset local
    // read before any store does not occur in well-formed programs; we fall
    // back to a zero constant defensively).
    let mut stacks: HashMap<ValueId, Vec<ValueId>> = allocs.iter().map(|&a| (a, Vec::new())).collect();
    let entry = blocks[0];
    rename_block(m, &dom, &cfg, entry, &allocs, &mut stacks, &phis);

    // Sweep: delete the now-unused loads/stores/allocas.
    for &alloc in &allocs {
        let users: Vec<ValueId> = m.users(alloc).to_vec();
        for u in users {
            m.clear_operands(u);
            remove_from_parent(m, u);
        }
        m.clear_operands(alloc);
        remove_from_parent(m, alloc);
    }

    true
}

fn remove_from_parent(m: &mut Module, instr: ValueId) {
    let parent = m.value(instr).kind.as_instr().and_then(|i| i.parent);
    if let Some(block) = parent {
        let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
        blk.instrs.retain(|&i| i != instr);
    }
}

fn rename_block(
    m: &mut Module,
    dom: &DomTree,
    cfg: &crate::cfg::Cfg,
    block: ValueId,
    allocs: &[ValueId],
    stacks: &mut HashMap<ValueId, Vec<ValueId>>,
    phis: &HashMap<(ValueId, ValueId), ValueId>,
) {
    let entry_heights: HashMap<ValueId, usize> = allocs.iter().map(|&a| (a, stacks[&a].len())).collect();

    for &a in allocs {
        if let Some(&phi) = phis.get(&(block, a)) {
            stacks.get_mut(&a).unwrap().push(phi);
        }
    }

    let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
    for instr in instrs {
        let data = m.value(instr).kind.as_instr().cloned();
        let Some(i) = data else { continue };
        match &i.operator {
            Operator::Load if allocs.contains(&i.operands[0]) => {
                let alloc = i.operands[0];
                let current = *stacks[&alloc].last().expect("alloc read before any def");
                m.replace_all_uses_with(instr, current);
            }
            Operator::Store if allocs.contains(&i.operands[0]) => {
                let alloc = i.operands[0];
                let value = i.operands[1];
                stacks.get_mut(&alloc).unwrap().push(value);
            }
            _ => {}
        }
    }

    for &succ in cfg.successors(block) {
        for &a in allocs {
            if let Some(&phi) = phis.get(&(succ, a)) {
                let incoming = *stacks[&a].last().expect("live phi operand must have a reaching def");
                let mut bld = sysy_mir::Builder::new(m);
                bld.add_incoming(phi, block, incoming);
            }
        }
    }

    for &child in dom.children(block) {
        rename_block(m, dom, cfg, child, allocs, stacks, phis);
    }

    // Restore each alloc's definition stack to the height it had on entry
    // to this block, per the rename algorithm's "pop on return from DFS".
    for &a in allocs {
        stacks.get_mut(&a).unwrap().truncate(entry_heights[&a]);
    }
}

pub struct Mem2Reg;

impl Transform for Mem2Reg {
    fn name(&self) -> &'static str {
        "Mem2Reg"
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
                pm.mark_dirty(f);
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{verify_no_scalar_allocas, Builder, Const, Module};

    #[test]
    fn promotes_a_simple_scalar() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let p = b.alloc(i32_ty);
        let c = b.module.make_const(Const::Int(42));
        b.store(p, c);
        let v = b.load(p);
        b.ret(Some(v));

        let mut pm = PassManager::new();
        let mut pass = Mem2Reg;
        let changed = pass.run(&mut m, &mut pm).unwrap();
        assert!(changed);
        verify_no_scalar_allocas(&m, f).unwrap();
    }

    #[test]
    fn promotes_across_a_diamond_with_a_phi() {
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
        let p = b.alloc(i32_ty);
        let zero = b.module.make_const(Const::Int(0));
        b.store(p, zero);
        let cond = b.icmp(sysy_mir::CmpOp::Gt, n, zero);
        b.branch(cond, then_blk, else_blk);

        b.set_insert_point(then_blk);
        let one = b.module.make_const(Const::Int(1));
        b.store(p, one);
        b.jump(join);

        b.set_insert_point(else_blk);
        b.jump(join);

        b.set_insert_point(join);
        let v = b.load(p);
        b.ret(Some(v));

        let mut pm = PassManager::new();
        let mut pass = Mem2Reg;
        pass.run(&mut m, &mut pm).unwrap();
        verify_no_scalar_allocas(&m, f).unwrap();
        sysy_mir::verify_module(&m).expect("still well-formed after promotion");
    }
}
